//! Row types for database queries.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{Result, SmsNoteError};
use crate::storage::types::{Note, NoteId, User, UserId};

pub const USER_COLUMNS: &str = "id, username, phone, password_hash, created_at";
pub const NOTE_COLUMNS: &str = "id, user_id, text, created_at";

/// Fixed-width RFC 3339 so stored timestamps compare correctly as text.
pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .map_err(|e| SmsNoteError::Storage(format!("Invalid timestamp: {}", e)))?
        .with_timezone(&Utc))
}

/// Raw row data from the users table.
#[derive(Debug)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub phone: String,
    pub password_hash: String,
    pub created_at: String,
}

impl UserRow {
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            phone: row.get(2)?,
            password_hash: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}

impl TryFrom<UserRow> for User {
    type Error = SmsNoteError;

    fn try_from(row: UserRow) -> Result<Self> {
        if row.password_hash.is_empty() {
            return Err(SmsNoteError::Storage(format!(
                "User {} has no password hash",
                row.id
            )));
        }
        Ok(User::new(
            UserId::new(row.id.to_string()),
            row.username,
            row.phone,
            row.password_hash,
            parse_timestamp(&row.created_at)?,
        ))
    }
}

/// Raw row data from the notes table.
#[derive(Debug)]
pub struct NoteRow {
    pub id: i64,
    pub user_id: i64,
    pub text: String,
    pub created_at: String,
}

impl NoteRow {
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            text: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}

impl TryFrom<NoteRow> for Note {
    type Error = SmsNoteError;

    fn try_from(row: NoteRow) -> Result<Self> {
        Ok(Note {
            id: NoteId::new(row.id.to_string()),
            user_id: UserId::new(row.user_id.to_string()),
            text: row.text,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamps_sort_as_text() {
        let early = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let late = early + chrono::Duration::microseconds(1);
        assert!(format_timestamp(early) < format_timestamp(late));
        assert_eq!(format_timestamp(early), "2026-01-02T03:04:05.000000Z");
    }

    #[test]
    fn test_note_row_conversion() {
        let row = NoteRow {
            id: 7,
            user_id: 3,
            text: "hello".to_string(),
            created_at: "2026-01-02T03:04:05.000000Z".to_string(),
        };
        let note: Note = row.try_into().unwrap();
        assert_eq!(note.id.as_str(), "7");
        assert_eq!(note.user_id.as_str(), "3");
    }

    #[test]
    fn test_user_row_without_hash_rejected() {
        let row = UserRow {
            id: 1,
            username: "alice".to_string(),
            phone: "+12015550123".to_string(),
            password_hash: String::new(),
            created_at: "2026-01-02T03:04:05.000000Z".to_string(),
        };
        assert!(User::try_from(row).is_err());
    }
}
