//! SQLite storage backend.
//!
//! Username and phone uniqueness is enforced by `UNIQUE` constraints, so two
//! concurrent registrations cannot both succeed. Pages are read with
//! `ORDER BY id DESC LIMIT ? OFFSET ?`; offset paging is only stable when no
//! notes are inserted or deleted ahead of the cursor between page fetches.

mod row;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration as StdDuration;

use chrono::Duration;
use rusqlite::{params, Connection, OptionalExtension};

use crate::clock::{Clock, SystemClock};
use crate::context::CallContext;
use crate::error::{Result, SmsNoteError};
use crate::security::{issue_session_token, session_user_id, Security};
use crate::storage::traits::NoteStore;
use crate::storage::types::{Note, NotePage, User, UserId, UserUpdate};

use row::{format_timestamp, NoteRow, UserRow, NOTE_COLUMNS, USER_COLUMNS};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        phone TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL CHECK (password_hash <> ''),
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS notes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        text TEXT NOT NULL,
        created_at TEXT NOT NULL,

        FOREIGN KEY(user_id) REFERENCES users(id)
    );

    CREATE INDEX IF NOT EXISTS notes_by_user ON notes (user_id, id);
    CREATE INDEX IF NOT EXISTS notes_by_user_created ON notes (user_id, created_at);
"#;

const BUSY_TIMEOUT: StdDuration = StdDuration::from_secs(5);

/// SQLite storage engine.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    security: Arc<dyn Security>,
    clock: Arc<dyn Clock>,
}

impl SqliteStore {
    /// Open (creating if needed) a database file.
    pub fn open(path: &Path, security: Arc<dyn Security>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::init(conn, security)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory(security: Arc<dyn Security>) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, security)
    }

    /// Replace the clock used for note timestamps and time windows.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn init(conn: Connection, security: Arc<dyn Security>) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            security,
            clock: Arc::new(SystemClock),
        })
    }

    /// Close the connection, reporting any error SQLite raises while doing so.
    pub fn close(self) -> Result<()> {
        let conn = self
            .conn
            .into_inner()
            .map_err(|_| SmsNoteError::Storage("SQLite connection poisoned".to_string()))?;
        conn.close().map_err(|(_, err)| err.into())
    }

    /// Verify foreign keys and uniqueness still hold.
    pub fn check_integrity(&self) -> Result<()> {
        let conn = self.lock_conn()?;

        let mut stmt = conn.prepare("PRAGMA foreign_key_check")?;
        let mut rows = stmt.query([])?;
        if rows.next()?.is_some() {
            return Err(SmsNoteError::Storage(
                "Foreign key integrity check failed".to_string(),
            ));
        }

        let duplicate_usernames: i64 = conn.query_row(
            "SELECT COUNT(*) FROM (SELECT 1 FROM users GROUP BY username HAVING COUNT(*) > 1)",
            [],
            |row| row.get(0),
        )?;
        let duplicate_phones: i64 = conn.query_row(
            "SELECT COUNT(*) FROM (SELECT 1 FROM users GROUP BY phone HAVING COUNT(*) > 1)",
            [],
            |row| row.get(0),
        )?;
        if duplicate_usernames > 0 || duplicate_phones > 0 {
            return Err(SmsNoteError::Storage(
                "Duplicate usernames or phone numbers found".to_string(),
            ));
        }

        Ok(())
    }

    /// Lock the database connection, returning an error if the mutex is poisoned.
    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| SmsNoteError::Storage("SQLite connection poisoned".to_string()))
    }

    fn row_id(id: &UserId) -> Result<i64> {
        id.as_str()
            .parse()
            .map_err(|_| SmsNoteError::NotFound(format!("user {}", id)))
    }

    /// Map constraint violations on write to domain errors.
    fn write_error(err: rusqlite::Error) -> SmsNoteError {
        if let rusqlite::Error::SqliteFailure(ref failure, ref message) = err {
            let message = message.as_deref().unwrap_or_default();
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE {
                let field = if message.contains("users.username") {
                    "Username"
                } else if message.contains("users.phone") {
                    "Phone number"
                } else {
                    "Value"
                };
                return SmsNoteError::Conflict(format!("{} already registered", field));
            }
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY {
                return SmsNoteError::NotFound("user".to_string());
            }
        }
        err.into()
    }

    fn find_user(conn: &Connection, column: &str, value: &dyn rusqlite::ToSql) -> Result<Option<User>> {
        let query = format!("SELECT {} FROM users WHERE {} = ?", USER_COLUMNS, column);
        let row = conn
            .query_row(&query, [value], UserRow::from_row)
            .optional()?;
        row.map(User::try_from).transpose()
    }

    fn query_notes(
        conn: &Connection,
        query: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<Note>> {
        let mut stmt = conn.prepare(query)?;
        let rows = stmt.query_map(params, NoteRow::from_row)?;
        let mut notes = Vec::new();
        for row in rows {
            notes.push(row?.try_into()?);
        }
        Ok(notes)
    }

    fn with_session(&self, user: User) -> Result<User> {
        let token = issue_session_token(self.security.as_ref(), &user.id)?;
        Ok(user.with_token(token))
    }
}

impl NoteStore for SqliteStore {
    fn user_create(
        &self,
        ctx: &CallContext,
        username: &str,
        password: &str,
        phone: &str,
    ) -> Result<User> {
        ctx.check()?;
        let password_hash = self.security.hash_password(password)?;
        let now = format_timestamp(self.clock.now());

        ctx.check()?;
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO users (username, phone, password_hash, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
            params![username, phone, password_hash, now, now],
        )
        .map_err(Self::write_error)?;
        let id = conn.last_insert_rowid();
        let user = Self::find_user(&conn, "id", &id)?
            .ok_or_else(|| SmsNoteError::Storage("Inserted user not found".to_string()))?;
        drop(conn);

        tracing::debug!(user_id = %user.id, "sqlite: created user");
        self.with_session(user)
    }

    fn user_login(&self, ctx: &CallContext, username: &str, password: &str) -> Result<User> {
        ctx.check()?;
        let user = {
            let conn = self.lock_conn()?;
            Self::find_user(&conn, "username", &username)?
        }
        .ok_or_else(|| SmsNoteError::NotFound(format!("user {}", username)))?;

        ctx.check()?;
        self.security.verify_password(password, user.password_hash())?;
        self.with_session(user)
    }

    fn user_get(&self, ctx: &CallContext, token: &str) -> Result<User> {
        ctx.check()?;
        let user_id = session_user_id(self.security.as_ref(), token)?;
        let id = Self::row_id(&user_id)?;
        let conn = self.lock_conn()?;
        let user = Self::find_user(&conn, "id", &id)?
            .ok_or_else(|| SmsNoteError::NotFound(format!("user {}", user_id)))?;
        Ok(user.with_token(token.to_string()))
    }

    fn user_get_by_number(&self, ctx: &CallContext, number: &str) -> Result<User> {
        ctx.check()?;
        let conn = self.lock_conn()?;
        Self::find_user(&conn, "phone", &number)?
            .ok_or_else(|| SmsNoteError::NotFound("phone number".to_string()))
    }

    fn user_get_by_username(&self, ctx: &CallContext, username: &str) -> Result<User> {
        ctx.check()?;
        let conn = self.lock_conn()?;
        Self::find_user(&conn, "username", &username)?
            .ok_or_else(|| SmsNoteError::NotFound(format!("user {}", username)))
    }

    fn user_save(&self, ctx: &CallContext, user: &User, update: &UserUpdate) -> Result<User> {
        ctx.check()?;
        let id = Self::row_id(&user.id)?;
        let conn = self.lock_conn()?;

        if !update.is_empty() {
            let changed = conn
                .execute(
                    "UPDATE users SET
                        username = COALESCE(?, username),
                        phone = COALESCE(?, phone),
                        password_hash = COALESCE(?, password_hash),
                        updated_at = ?
                     WHERE id = ?",
                    params![
                        update.username(),
                        update.phone(),
                        update.password_hash(),
                        format_timestamp(self.clock.now()),
                        id
                    ],
                )
                .map_err(Self::write_error)?;
            if changed == 0 {
                return Err(SmsNoteError::NotFound(format!("user {}", user.id)));
            }
            tracing::debug!(user_id = %user.id, ?update, "sqlite: saved user");
        }

        let mut saved = Self::find_user(&conn, "id", &id)?
            .ok_or_else(|| SmsNoteError::NotFound(format!("user {}", user.id)))?;
        saved.token = user.token.clone();
        Ok(saved)
    }

    fn note_create(&self, ctx: &CallContext, user: &User, text: &str) -> Result<Note> {
        ctx.check()?;
        let user_id = Self::row_id(&user.id)?;
        let created_at = format_timestamp(self.clock.now());
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO notes (user_id, text, created_at) VALUES (?, ?, ?)",
            params![user_id, text, created_at],
        )
        .map_err(Self::write_error)?;
        let id = conn.last_insert_rowid();
        let query = format!("SELECT {} FROM notes WHERE id = ?", NOTE_COLUMNS);
        let row = conn.query_row(&query, [id], NoteRow::from_row)?;
        tracing::debug!(user_id = %user.id, note_id = id, "sqlite: created note");
        row.try_into()
    }

    fn note_list(
        &self,
        ctx: &CallContext,
        user: &User,
        page: usize,
        page_size: usize,
    ) -> Result<NotePage> {
        ctx.check()?;
        if page_size == 0 {
            return Err(SmsNoteError::Validation(
                "Page size must be at least 1".to_string(),
            ));
        }
        let offset = page
            .checked_mul(page_size)
            .and_then(|offset| i64::try_from(offset).ok())
            .ok_or_else(|| SmsNoteError::Validation("Page out of range".to_string()))?;
        let limit = i64::try_from(page_size + 1)
            .map_err(|_| SmsNoteError::Validation("Page size out of range".to_string()))?;
        let user_id = Self::row_id(&user.id)?;

        let conn = self.lock_conn()?;
        let query = format!(
            "SELECT {} FROM notes WHERE user_id = ? ORDER BY id DESC LIMIT ? OFFSET ?",
            NOTE_COLUMNS
        );
        let rows = Self::query_notes(&conn, &query, &[&user_id, &limit, &offset])?;
        Ok(NotePage::from_lookahead(rows, page_size))
    }

    fn note_latest(&self, ctx: &CallContext, user: &User) -> Result<Option<Note>> {
        ctx.check()?;
        let user_id = Self::row_id(&user.id)?;
        let conn = self.lock_conn()?;
        let query = format!(
            "SELECT {} FROM notes WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT 1",
            NOTE_COLUMNS
        );
        let rows = Self::query_notes(&conn, &query, &[&user_id])?;
        Ok(rows.into_iter().next())
    }

    fn note_latest_within(
        &self,
        ctx: &CallContext,
        user: &User,
        window: Duration,
    ) -> Result<Option<Note>> {
        ctx.check()?;
        let user_id = Self::row_id(&user.id)?;
        let cutoff = format_timestamp(self.clock.now() - window);
        let conn = self.lock_conn()?;
        let query = format!(
            "SELECT {} FROM notes WHERE user_id = ? AND created_at >= ? ORDER BY created_at DESC, id DESC LIMIT 1",
            NOTE_COLUMNS
        );
        let rows = Self::query_notes(&conn, &query, &[&user_id, &cutoff])?;
        Ok(rows.into_iter().next())
    }

    fn user_export_all(&self, ctx: &CallContext, user: &User) -> Result<Vec<Note>> {
        ctx.check()?;
        let user_id = Self::row_id(&user.id)?;
        let conn = self.lock_conn()?;
        let query = format!(
            "SELECT {} FROM notes WHERE user_id = ? ORDER BY id ASC",
            NOTE_COLUMNS
        );
        Self::query_notes(&conn, &query, &[&user_id])
    }

    fn user_erase_all(&self, ctx: &CallContext, user: &User) -> Result<()> {
        ctx.check()?;
        let user_id = Self::row_id(&user.id)?;
        let mut conn = self.lock_conn()?;

        let tx = conn.transaction()?;
        let notes = tx.execute("DELETE FROM notes WHERE user_id = ?", [user_id])?;
        let users = tx.execute("DELETE FROM users WHERE id = ?", [user_id])?;
        if users == 0 {
            // Dropping the transaction rolls back the note deletes.
            return Err(SmsNoteError::NotFound(format!("user {}", user.id)));
        }
        ctx.check()?;
        tx.commit()?;

        tracing::info!(user_id = %user.id, notes, "sqlite: erased user data");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::{HashCost, StandardSecurity};
    use secrecy::SecretString;

    fn store() -> SqliteStore {
        let security = StandardSecurity::with_cost(
            SecretString::from("unit-secret".to_string()),
            HashCost::minimal(),
        )
        .unwrap();
        SqliteStore::open_in_memory(Arc::new(security)).unwrap()
    }

    #[test]
    fn test_unique_violation_maps_to_conflict() {
        let store = store();
        let ctx = CallContext::background();
        store
            .user_create(&ctx, "alice", "pw", "+12015550123")
            .unwrap();
        let err = store
            .user_create(&ctx, "alice", "pw", "+16502530000")
            .unwrap_err();
        assert!(matches!(err, SmsNoteError::Conflict(ref msg) if msg.starts_with("Username")));
        let err = store
            .user_create(&ctx, "bob", "pw", "+12015550123")
            .unwrap_err();
        assert!(matches!(err, SmsNoteError::Conflict(ref msg) if msg.starts_with("Phone")));
        store.check_integrity().unwrap();
    }

    #[test]
    fn test_note_for_missing_user_is_not_found() {
        let store = store();
        let ctx = CallContext::background();
        let ghost = User::new(
            UserId::from("999"),
            "ghost".to_string(),
            "+12015550123".to_string(),
            "hash".to_string(),
            chrono::Utc::now(),
        );
        let err = store.note_create(&ctx, &ghost, "boo").unwrap_err();
        assert!(matches!(err, SmsNoteError::NotFound(_)));
    }

    #[test]
    fn test_foreign_id_format_is_not_found() {
        let store = store();
        let ctx = CallContext::background();
        let other = User::new(
            UserId::from("3f1c6f0e-6c1a-4c43-9a53-6d1f4a0c2b11"),
            "other".to_string(),
            "+12015550123".to_string(),
            "hash".to_string(),
            chrono::Utc::now(),
        );
        assert!(matches!(
            store.note_latest(&ctx, &other),
            Err(SmsNoteError::NotFound(_))
        ));
    }

    #[test]
    fn test_cancelled_context_performs_no_write() {
        let store = store();
        let ctx = CallContext::background();
        ctx.cancel_handle().cancel();
        let err = store
            .user_create(&ctx, "alice", "pw", "+12015550123")
            .unwrap_err();
        assert!(matches!(err, SmsNoteError::Cancelled));

        let fresh = CallContext::background();
        assert!(matches!(
            store.user_get_by_username(&fresh, "alice"),
            Err(SmsNoteError::NotFound(_))
        ));
    }

    #[test]
    fn test_file_database_persists_across_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("smsnote.db");
        let security: Arc<dyn Security> = Arc::new(
            StandardSecurity::with_cost(
                SecretString::from("unit-secret".to_string()),
                HashCost::minimal(),
            )
            .unwrap(),
        );
        let ctx = CallContext::background();

        let store = SqliteStore::open(&path, security.clone()).unwrap();
        store
            .user_create(&ctx, "alice", "pw", "+12015550123")
            .unwrap();
        store.close().unwrap();

        let reopened = SqliteStore::open(&path, security).unwrap();
        let user = reopened.user_get_by_username(&ctx, "alice").unwrap();
        assert_eq!(user.phone, "+12015550123");
    }
}
