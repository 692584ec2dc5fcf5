//! Core data types for the storage layer.
//!
//! Identifiers are opaque strings: the SQLite backend renders its integer
//! row ids, the document backend hands out UUIDs. Nothing outside a backend
//! may parse or order them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SmsNoteError};
use crate::phone::normalize_phone;
use crate::security::Security;

/// Number of characters kept in a note preview.
pub const PREVIEW_CHARS: usize = 50;

/// Longest accepted username, in characters.
pub const MAX_USERNAME_CHARS: usize = 64;

/// Opaque user identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque note identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(String);

impl NoteId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A registered user.
#[derive(Clone, Serialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    /// E.164 phone number
    pub phone: String,
    #[serde(skip)]
    pub(crate) password_hash: String,
    pub created_at: DateTime<Utc>,
    /// Session token minted for the current request, never persisted
    #[serde(skip)]
    pub(crate) token: Option<String>,
}

impl User {
    pub fn new(
        id: UserId,
        username: String,
        phone: String,
        password_hash: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            username,
            phone,
            password_hash,
            created_at,
            token: None,
        }
    }

    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }

    /// Session token issued for this request, if any.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn with_token(mut self, token: String) -> Self {
        self.token = Some(token);
        self
    }

    /// Copy of this user with `update` applied.
    pub fn updated(&self, update: &UserUpdate) -> User {
        let mut next = self.clone();
        if let Some(username) = update.username() {
            next.username = username.to_string();
        }
        if let Some(phone) = update.phone() {
            next.phone = phone.to_string();
        }
        if let Some(hash) = update.password_hash() {
            next.password_hash = hash.to_string();
        }
        next
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("phone", &self.phone)
            .field("password_hash", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// A note authored by a user. The text never changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub user_id: UserId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Note {
    /// Preview of the text, cut on a character boundary.
    pub fn short(&self) -> String {
        preview(&self.text)
    }
}

/// First [`PREVIEW_CHARS`] characters of `text`, with `...` when cut.
pub fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// One page of notes, newest first.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NotePage {
    pub notes: Vec<Note>,
    pub has_more: bool,
}

impl NotePage {
    /// Build a page from up to `page_size + 1` rows.
    ///
    /// The extra row only signals that another page exists and is dropped.
    pub fn from_lookahead(mut rows: Vec<Note>, page_size: usize) -> Self {
        let has_more = rows.len() > page_size;
        rows.truncate(page_size);
        Self {
            notes: rows,
            has_more,
        }
    }
}

/// Validated field changes for an existing user.
///
/// Each setter validates (or hashes) its input immediately and returns the
/// failure to the caller, so a `UserUpdate` that exists is always safe to
/// save.
#[derive(Clone, Default)]
pub struct UserUpdate {
    username: Option<String>,
    password_hash: Option<String>,
    phone: Option<String>,
}

impl UserUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password_hash(&self) -> Option<&str> {
        self.password_hash.as_deref()
    }

    pub fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.password_hash.is_none() && self.phone.is_none()
    }

    pub fn set_username(mut self, username: &str) -> Result<Self> {
        self.username = Some(normalize_username(username)?);
        Ok(self)
    }

    pub fn set_password(mut self, security: &dyn Security, plaintext: &str) -> Result<Self> {
        if plaintext.is_empty() {
            return Err(SmsNoteError::Validation(
                "Password cannot be empty".to_string(),
            ));
        }
        self.password_hash = Some(security.hash_password(plaintext)?);
        Ok(self)
    }

    pub fn set_phone(mut self, phone: &str) -> Result<Self> {
        self.phone = Some(normalize_phone(phone)?);
        Ok(self)
    }
}

impl fmt::Debug for UserUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserUpdate")
            .field("username", &self.username)
            .field("password", &self.password_hash.as_ref().map(|_| "[CHANGED]"))
            .field("phone", &self.phone)
            .finish()
    }
}

/// Trim a username and check it is usable.
pub fn normalize_username(username: &str) -> Result<String> {
    let trimmed = username.trim();
    if trimmed.is_empty() {
        return Err(SmsNoteError::Validation(
            "Username cannot be empty".to_string(),
        ));
    }
    if trimmed.chars().count() > MAX_USERNAME_CHARS {
        return Err(SmsNoteError::Validation(format!(
            "Username must be at most {} characters",
            MAX_USERNAME_CHARS
        )));
    }
    Ok(trimmed.to_string())
}
