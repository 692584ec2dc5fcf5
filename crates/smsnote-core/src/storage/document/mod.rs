//! Document-store backend.
//!
//! The store has no unique constraints, so uniqueness of usernames and phone
//! numbers is enforced with reservation documents: one document per taken
//! value, keyed by the BLAKE3 hash of the value and created with an exclusive
//! create. A registration that loses the race to create the reservation gets
//! `Conflict`. A reservation whose holder no longer has the value (or no
//! longer exists, after a grace period) is stale. It is taken over by deleting
//! it only if it is unchanged and then creating a new one exclusively, so
//! racing registrations end with one holder.
//!
//! Notes are ordered by `created_at`, ties broken by note id. Ids are UUID v7,
//! so equal timestamps keep insertion order.

mod collection;

pub use collection::{Direction, Document, DocumentStore, Query};

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::{Clock, SystemClock};
use crate::context::CallContext;
use crate::error::{Result, SmsNoteError};
use crate::security::{issue_session_token, session_user_id, Security};
use crate::storage::traits::NoteStore;
use crate::storage::types::{Note, NoteId, NotePage, User, UserId, UserUpdate};

use collection::is_valid_name;

const USERS: &str = "users";
const NOTES: &str = "notes";

/// How long a reservation without a holder document is honored. Covers the
/// gap between reserving a value and writing the new user.
const RESERVATION_GRACE_SECONDS: i64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserDoc {
    username: String,
    phone: String,
    password_hash: String,
    /// Microseconds since the Unix epoch
    created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NoteDoc {
    user_id: String,
    text: String,
    created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Reservation {
    user_id: String,
    value: String,
    reserved_at: i64,
}

/// A value that must be unique across users.
#[derive(Debug, Clone, Copy)]
enum Unique {
    Username,
    Phone,
}

impl Unique {
    fn collection(self) -> &'static str {
        match self {
            Unique::Username => "usernames",
            Unique::Phone => "phones",
        }
    }

    fn field(self) -> &'static str {
        match self {
            Unique::Username => "username",
            Unique::Phone => "phone",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Unique::Username => "Username",
            Unique::Phone => "Phone number",
        }
    }

    fn value_of(self, doc: &UserDoc) -> &str {
        match self {
            Unique::Username => &doc.username,
            Unique::Phone => &doc.phone,
        }
    }

    fn conflict(self) -> SmsNoteError {
        SmsNoteError::Conflict(format!("{} already registered", self.label()))
    }
}

fn reservation_key(value: &str) -> String {
    blake3::hash(value.as_bytes()).to_hex().to_string()
}

fn from_micros(value: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(value)
        .ok_or_else(|| SmsNoteError::Storage(format!("Invalid timestamp: {}", value)))
}

fn to_user(id: &str, doc: UserDoc) -> Result<User> {
    if doc.password_hash.is_empty() {
        return Err(SmsNoteError::Storage(format!(
            "User {} has no password hash",
            id
        )));
    }
    Ok(User::new(
        UserId::new(id),
        doc.username,
        doc.phone,
        doc.password_hash,
        from_micros(doc.created_at)?,
    ))
}

fn to_note(document: Document) -> Result<Note> {
    let doc: NoteDoc = serde_json::from_value(document.data)?;
    Ok(Note {
        id: NoteId::new(document.id),
        user_id: UserId::new(doc.user_id),
        text: doc.text,
        created_at: from_micros(doc.created_at)?,
    })
}

fn to_notes(documents: Vec<Document>) -> Result<Vec<Note>> {
    documents.into_iter().map(to_note).collect()
}

/// `NoteStore` over a [`DocumentStore`].
pub struct DocumentNoteStore {
    db: DocumentStore,
    security: Arc<dyn Security>,
    clock: Arc<dyn Clock>,
}

impl DocumentNoteStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>, security: Arc<dyn Security>) -> Result<Self> {
        Ok(Self {
            db: DocumentStore::open(root)?,
            security,
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.db
    }

    fn load_user(&self, id: &str) -> Result<Option<UserDoc>> {
        // Ids minted by another backend can never name a document here.
        if !is_valid_name(id) {
            return Ok(None);
        }
        self.db
            .get(USERS, id)?
            .map(serde_json::from_value)
            .transpose()
            .map_err(Into::into)
    }

    fn require_user(&self, id: &UserId) -> Result<UserDoc> {
        self.load_user(id.as_str())?
            .ok_or_else(|| SmsNoteError::NotFound(format!("user {}", id)))
    }

    fn find_by(&self, unique: Unique, value: &str) -> Result<Option<User>> {
        let query = Query::new(USERS).where_eq(unique.field(), value).limit(1);
        match self.db.query(&query)?.into_iter().next() {
            Some(document) => {
                let doc: UserDoc = serde_json::from_value(document.data)?;
                Ok(Some(to_user(&document.id, doc)?))
            }
            None => Ok(None),
        }
    }

    /// Read-before-write check against existing user documents.
    fn ensure_unclaimed(&self, unique: Unique, value: &str, owner: &UserId) -> Result<()> {
        match self.find_by(unique, value)? {
            Some(holder) if holder.id != *owner => Err(unique.conflict()),
            _ => Ok(()),
        }
    }

    fn reservation_is_stale(&self, unique: Unique, existing: &Reservation) -> Result<bool> {
        match self.load_user(&existing.user_id)? {
            Some(holder) => Ok(unique.value_of(&holder) != existing.value),
            None => {
                let reserved_at = from_micros(existing.reserved_at)?;
                Ok(self.clock.now() - reserved_at > Duration::seconds(RESERVATION_GRACE_SECONDS))
            }
        }
    }

    /// Reserve `value` for `owner`, failing with `Conflict` if someone else
    /// holds a live reservation.
    fn reserve(&self, unique: Unique, value: &str, owner: &UserId) -> Result<()> {
        let key = reservation_key(value);
        let claim = serde_json::to_value(Reservation {
            user_id: owner.to_string(),
            value: value.to_string(),
            reserved_at: self.clock.now().timestamp_micros(),
        })?;
        if self.db.create(unique.collection(), &key, &claim)? {
            return Ok(());
        }

        let Some(raw) = self.db.get(unique.collection(), &key)? else {
            // Released between our create and get.
            return self.claim_fresh(unique, &key, &claim);
        };
        let existing: Reservation = serde_json::from_value(raw.clone())?;
        if existing.user_id == owner.as_str() {
            return Ok(());
        }
        if !self.reservation_is_stale(unique, &existing)? {
            return Err(unique.conflict());
        }
        tracing::warn!(
            field = unique.field(),
            previous = %existing.user_id,
            "document: taking over stale reservation"
        );
        self.take_over(unique, &key, &raw, &claim)
    }

    /// Replace the stale reservation `stale` with `claim`.
    ///
    /// Only one of several writers holding the same stale snapshot wins; the
    /// others see `Conflict`.
    fn take_over(&self, unique: Unique, key: &str, stale: &Value, claim: &Value) -> Result<()> {
        if !self.db.delete_if_eq(unique.collection(), key, stale)? {
            return Err(unique.conflict());
        }
        self.claim_fresh(unique, key, claim)
    }

    fn claim_fresh(&self, unique: Unique, key: &str, claim: &Value) -> Result<()> {
        if self.db.create(unique.collection(), key, claim)? {
            Ok(())
        } else {
            Err(unique.conflict())
        }
    }

    /// Drop the reservation on `value` if `owner` holds it.
    fn release(&self, unique: Unique, value: &str, owner: &UserId) -> Result<()> {
        let key = reservation_key(value);
        let existing: Option<Reservation> = self
            .db
            .get(unique.collection(), &key)?
            .map(serde_json::from_value)
            .transpose()?;
        if existing.is_some_and(|r| r.user_id == owner.as_str()) {
            self.db.delete(unique.collection(), &key)?;
        }
        Ok(())
    }

    /// Undo reservations taken for a write that did not happen.
    fn release_all(&self, claims: &[(Unique, &str)], owner: &UserId) {
        for (unique, value) in claims {
            if let Err(err) = self.release(*unique, value, owner) {
                tracing::warn!(
                    field = unique.field(),
                    error = %err,
                    "document: failed to release reservation"
                );
            }
        }
    }

    fn with_session(&self, user: User) -> Result<User> {
        let token = issue_session_token(self.security.as_ref(), &user.id)?;
        Ok(user.with_token(token))
    }

    fn user_notes(&self, user: &User) -> Query {
        Query::new(NOTES).where_eq("user_id", user.id.as_str())
    }

    fn first_note(&self, query: Query) -> Result<Option<Note>> {
        let query = query.order_by("created_at", Direction::Desc).limit(1);
        self.db
            .query(&query)?
            .into_iter()
            .next()
            .map(to_note)
            .transpose()
    }
}

impl NoteStore for DocumentNoteStore {
    fn user_create(
        &self,
        ctx: &CallContext,
        username: &str,
        password: &str,
        phone: &str,
    ) -> Result<User> {
        ctx.check()?;
        let id = UserId::new(DocumentStore::new_id());
        self.ensure_unclaimed(Unique::Username, username, &id)?;
        self.ensure_unclaimed(Unique::Phone, phone, &id)?;

        let password_hash = self.security.hash_password(password)?;
        let created_at = self.clock.now();

        ctx.check()?;
        self.reserve(Unique::Username, username, &id)?;
        if let Err(err) = self.reserve(Unique::Phone, phone, &id) {
            self.release_all(&[(Unique::Username, username)], &id);
            return Err(err);
        }

        let doc = UserDoc {
            username: username.to_string(),
            phone: phone.to_string(),
            password_hash,
            created_at: created_at.timestamp_micros(),
        };
        let written = serde_json::to_value(&doc)
            .map_err(SmsNoteError::from)
            .and_then(|data| self.db.create(USERS, id.as_str(), &data));
        match written {
            Ok(true) => {}
            Ok(false) => {
                self.release_all(&[(Unique::Username, username), (Unique::Phone, phone)], &id);
                return Err(SmsNoteError::Storage("User id collision".to_string()));
            }
            Err(err) => {
                self.release_all(&[(Unique::Username, username), (Unique::Phone, phone)], &id);
                return Err(err);
            }
        }

        tracing::debug!(user_id = %id, "document: created user");
        self.with_session(to_user(id.as_str(), doc)?)
    }

    fn user_login(&self, ctx: &CallContext, username: &str, password: &str) -> Result<User> {
        ctx.check()?;
        let user = self
            .find_by(Unique::Username, username)?
            .ok_or_else(|| SmsNoteError::NotFound(format!("user {}", username)))?;

        ctx.check()?;
        self.security.verify_password(password, user.password_hash())?;
        self.with_session(user)
    }

    fn user_get(&self, ctx: &CallContext, token: &str) -> Result<User> {
        ctx.check()?;
        let user_id = session_user_id(self.security.as_ref(), token)?;
        let doc = self.require_user(&user_id)?;
        Ok(to_user(user_id.as_str(), doc)?.with_token(token.to_string()))
    }

    fn user_get_by_number(&self, ctx: &CallContext, number: &str) -> Result<User> {
        ctx.check()?;
        self.find_by(Unique::Phone, number)?
            .ok_or_else(|| SmsNoteError::NotFound("phone number".to_string()))
    }

    fn user_get_by_username(&self, ctx: &CallContext, username: &str) -> Result<User> {
        ctx.check()?;
        self.find_by(Unique::Username, username)?
            .ok_or_else(|| SmsNoteError::NotFound(format!("user {}", username)))
    }

    fn user_save(&self, ctx: &CallContext, user: &User, update: &UserUpdate) -> Result<User> {
        ctx.check()?;
        let current = self.require_user(&user.id)?;
        if update.is_empty() {
            let mut saved = to_user(user.id.as_str(), current)?;
            saved.token = user.token.clone();
            return Ok(saved);
        }

        let changes: Vec<(Unique, &str)> = [
            (Unique::Username, update.username()),
            (Unique::Phone, update.phone()),
        ]
        .into_iter()
        .filter_map(|(unique, value)| value.map(|value| (unique, value)))
        .filter(|(unique, value)| unique.value_of(&current) != *value)
        .collect();

        for (unique, value) in &changes {
            self.ensure_unclaimed(*unique, value, &user.id)?;
        }

        ctx.check()?;
        let mut reserved = Vec::new();
        for (unique, value) in &changes {
            if let Err(err) = self.reserve(*unique, value, &user.id) {
                self.release_all(&reserved, &user.id);
                return Err(err);
            }
            reserved.push((*unique, *value));
        }

        let next = UserDoc {
            username: update
                .username()
                .unwrap_or(current.username.as_str())
                .to_string(),
            phone: update.phone().unwrap_or(current.phone.as_str()).to_string(),
            password_hash: update
                .password_hash()
                .unwrap_or(current.password_hash.as_str())
                .to_string(),
            created_at: current.created_at,
        };
        let written = serde_json::to_value(&next)
            .map_err(SmsNoteError::from)
            .and_then(|data| self.db.set(USERS, user.id.as_str(), &data));
        if let Err(err) = written {
            self.release_all(&reserved, &user.id);
            return Err(err);
        }

        let previous: Vec<(Unique, &str)> = changes
            .iter()
            .map(|(unique, _)| (*unique, unique.value_of(&current)))
            .collect();
        self.release_all(&previous, &user.id);

        tracing::debug!(user_id = %user.id, ?update, "document: saved user");
        let mut saved = to_user(user.id.as_str(), next)?;
        saved.token = user.token.clone();
        Ok(saved)
    }

    fn note_create(&self, ctx: &CallContext, user: &User, text: &str) -> Result<Note> {
        ctx.check()?;
        self.require_user(&user.id)?;
        let doc = NoteDoc {
            user_id: user.id.to_string(),
            text: text.to_string(),
            created_at: self.clock.now().timestamp_micros(),
        };
        let id = self.db.insert(NOTES, &serde_json::to_value(&doc)?)?;
        tracing::debug!(user_id = %user.id, note_id = %id, "document: created note");
        Ok(Note {
            id: NoteId::new(id),
            user_id: user.id.clone(),
            text: doc.text,
            created_at: from_micros(doc.created_at)?,
        })
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
            .ok_or_else(|| SmsNoteError::Validation("Page out of range".to_string()))?;
        let query = self
            .user_notes(user)
            .order_by("created_at", Direction::Desc)
            .offset(offset)
            .limit(page_size.saturating_add(1));
        let rows = to_notes(self.db.query(&query)?)?;
        Ok(NotePage::from_lookahead(rows, page_size))
    }

    fn note_latest(&self, ctx: &CallContext, user: &User) -> Result<Option<Note>> {
        ctx.check()?;
        self.first_note(self.user_notes(user))
    }

    fn note_latest_within(
        &self,
        ctx: &CallContext,
        user: &User,
        window: Duration,
    ) -> Result<Option<Note>> {
        ctx.check()?;
        let cutoff = (self.clock.now() - window).timestamp_micros();
        self.first_note(self.user_notes(user).where_gte("created_at", Value::from(cutoff)))
    }

    fn user_export_all(&self, ctx: &CallContext, user: &User) -> Result<Vec<Note>> {
        ctx.check()?;
        let query = self
            .user_notes(user)
            .order_by("created_at", Direction::Asc);
        to_notes(self.db.query(&query)?)
    }

    fn user_erase_all(&self, ctx: &CallContext, user: &User) -> Result<()> {
        ctx.check()?;
        let current = self.require_user(&user.id)?;

        let notes = self.db.query(&self.user_notes(user))?;
        let count = notes.len();
        for note in notes {
            ctx.check()?;
            self.db.delete(NOTES, &note.id)?;
        }

        ctx.check()?;
        self.db.delete(USERS, user.id.as_str())?;
        for unique in [Unique::Username, Unique::Phone] {
            self.release(unique, unique.value_of(&current), &user.id)?;
        }

        tracing::info!(user_id = %user.id, notes = count, "document: erased user data");
        Ok(())
    }
}
