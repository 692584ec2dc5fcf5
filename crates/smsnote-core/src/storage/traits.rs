//! Persistence contract.
//!
//! The `NoteStore` trait is the only view of storage the service has. It is
//! implemented by the SQLite backend and the document backend, and the two
//! must be indistinguishable to a caller.

use chrono::Duration;

use super::types::{Note, NotePage, User, UserUpdate};
use crate::context::CallContext;
use crate::error::Result;

/// Storage interface for users and their notes.
///
/// All implementations must ensure:
/// - Usernames and phone numbers are unique across users
/// - Passwords are only ever stored as hashes
/// - Notes are never modified after creation
/// - Every call honors the `CallContext` it is given
pub trait NoteStore: Send + Sync {
    // --- User operations ---

    /// Register a new user.
    ///
    /// The returned user carries a fresh session token.
    ///
    /// # Errors
    ///
    /// Returns `SmsNoteError::Conflict` if the username or phone number is
    /// already registered. A caller never observes a duplicate succeeding.
    fn user_create(
        &self,
        ctx: &CallContext,
        username: &str,
        password: &str,
        phone: &str,
    ) -> Result<User>;

    /// Check credentials and mint a session token.
    ///
    /// # Errors
    ///
    /// - `SmsNoteError::NotFound` if no user has this username
    /// - `SmsNoteError::Credentials` if the password does not match
    fn user_login(&self, ctx: &CallContext, username: &str, password: &str) -> Result<User>;

    /// Resolve a session token to the current stored state of its user.
    ///
    /// # Errors
    ///
    /// - `SmsNoteError::Token` if the token does not verify
    /// - `SmsNoteError::NotFound` if the user no longer exists
    fn user_get(&self, ctx: &CallContext, token: &str) -> Result<User>;

    /// Find a user by E.164 phone number.
    fn user_get_by_number(&self, ctx: &CallContext, number: &str) -> Result<User>;

    /// Find a user by username.
    fn user_get_by_username(&self, ctx: &CallContext, username: &str) -> Result<User>;

    /// Commit a validated set of field changes.
    ///
    /// Returns the user as stored after the write. An empty update performs
    /// no write.
    ///
    /// # Errors
    ///
    /// Returns `SmsNoteError::Conflict` if the new username or phone number
    /// belongs to another user.
    fn user_save(&self, ctx: &CallContext, user: &User, update: &UserUpdate) -> Result<User>;

    // --- Note operations ---

    /// Store a new note for `user`.
    fn note_create(&self, ctx: &CallContext, user: &User, text: &str) -> Result<Note>;

    /// One page of notes, newest first.
    ///
    /// `page` is zero-based. `has_more` is true only if a later page has at
    /// least one note.
    fn note_list(
        &self,
        ctx: &CallContext,
        user: &User,
        page: usize,
        page_size: usize,
    ) -> Result<NotePage>;

    /// Most recent note. `Ok(None)` when the user has none.
    fn note_latest(&self, ctx: &CallContext, user: &User) -> Result<Option<Note>>;

    /// Most recent note created at or after `now - window`.
    fn note_latest_within(
        &self,
        ctx: &CallContext,
        user: &User,
        window: Duration,
    ) -> Result<Option<Note>>;

    // --- Export / erasure ---

    /// Every note of `user`, oldest first.
    fn user_export_all(&self, ctx: &CallContext, user: &User) -> Result<Vec<Note>>;

    /// Delete every note of `user`, then the user.
    ///
    /// A failure partway is returned as an error, never reported as success.
    fn user_erase_all(&self, ctx: &CallContext, user: &User) -> Result<()>;
}
