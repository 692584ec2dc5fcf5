//! Identity and note service.
//!
//! `NoteService` is the only entry point callers use. It validates input
//! before touching storage, collapses errors that would reveal whether an
//! account exists, and drives the password-reset protocol:
//!
//! 1. `forgot_password` mints a reset token for the named user and sends a
//!    link containing it to the user's phone. The token is never returned.
//! 2. `reset_password` accepts the token while it is at most
//!    [`RESET_WINDOW_SECONDS`] old and while the user's password hash still
//!    matches the fingerprint the token was issued against.
//!
//! Every reset failure is reported as [`SmsNoteError::ResetFailed`].

use std::sync::Arc;

use chrono::Duration;
use serde_json::Value;

use crate::clock::{Clock, SystemClock};
use crate::context::CallContext;
use crate::error::{Result, SmsNoteError};
use crate::phone::normalize_phone;
use crate::security::{
    issue_session_token, password_stamp, Claims, Security, CLAIM_KIND, CLAIM_STAMP, CLAIM_TIME,
    CLAIM_USER_ID, KIND_RESET,
};
use crate::sms::SmsGateway;
use crate::storage::{normalize_username, Note, NotePage, NoteStore, User, UserId, UserUpdate};

/// Lifetime of a password-reset link.
pub const RESET_WINDOW_SECONDS: i64 = 5 * 60;

/// Placeholder replaced by the reset token in [`ServiceConfig::reset_link`].
pub const TOKEN_PLACEHOLDER: &str = "{token}";

const RESET_MESSAGE: &str = "Please visit the link below to reset your password.\n\n";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Notes per page in `list_notes`
    pub page_size: usize,
    /// Window used by `recent_note`
    pub recent_window: Duration,
    /// How long a reset link stays valid
    pub reset_window: Duration,
    /// Link template; must contain `{token}`
    pub reset_link: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            recent_window: Duration::minutes(5),
            reset_window: Duration::seconds(RESET_WINDOW_SECONDS),
            reset_link: "https://example.invalid/reset/{token}".to_string(),
        }
    }
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(SmsNoteError::Validation(
                "Page size must be at least 1".to_string(),
            ));
        }
        if self.recent_window < Duration::zero() {
            return Err(SmsNoteError::Validation(
                "Recent window cannot be negative".to_string(),
            ));
        }
        if !self.reset_link.contains(TOKEN_PLACEHOLDER) {
            return Err(SmsNoteError::Validation(format!(
                "Reset link must contain {}",
                TOKEN_PLACEHOLDER
            )));
        }
        Ok(())
    }
}

/// Fields a user asked to change. `None` or an empty string leaves the field
/// as it is.
#[derive(Default, Clone)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub password: Option<String>,
    pub password_confirm: Option<String>,
    pub phone: Option<String>,
}

impl std::fmt::Debug for ProfileUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileUpdate")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("phone", &self.phone)
            .finish()
    }
}

fn supplied(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn check_password_pair(password: &str, confirm: &str) -> Result<()> {
    if password.is_empty() {
        return Err(SmsNoteError::Validation(
            "Password cannot be empty".to_string(),
        ));
    }
    if password != confirm {
        return Err(SmsNoteError::Validation(
            "Passwords do not match".to_string(),
        ));
    }
    Ok(())
}

/// Hide which login step failed.
fn collapse_auth(err: SmsNoteError) -> SmsNoteError {
    match err {
        SmsNoteError::NotFound(_) | SmsNoteError::Credentials => {
            SmsNoteError::AuthenticationFailed
        }
        other => other,
    }
}

pub struct NoteService {
    store: Arc<dyn NoteStore>,
    security: Arc<dyn Security>,
    sms: Arc<dyn SmsGateway>,
    clock: Arc<dyn Clock>,
    config: ServiceConfig,
}

impl NoteService {
    pub fn new(
        store: Arc<dyn NoteStore>,
        security: Arc<dyn Security>,
        sms: Arc<dyn SmsGateway>,
    ) -> Self {
        Self {
            store,
            security,
            sms,
            clock: Arc::new(SystemClock),
            config: ServiceConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ServiceConfig) -> Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Register a new account and return it with a session token.
    ///
    /// All input is validated before the store is called.
    pub fn register(
        &self,
        ctx: &CallContext,
        username: &str,
        password: &str,
        password_confirm: &str,
        phone: &str,
    ) -> Result<User> {
        check_password_pair(password, password_confirm)?;
        let username = normalize_username(username)?;
        let phone = normalize_phone(phone)?;

        let user = self.store.user_create(ctx, &username, password, &phone)?;
        tracing::info!(user_id = %user.id, "registered user");
        Ok(user)
    }

    /// Check credentials and return the user with a fresh session token.
    pub fn login(&self, ctx: &CallContext, username: &str, password: &str) -> Result<User> {
        let user = self
            .store
            .user_login(ctx, username.trim(), password)
            .map_err(collapse_auth)?;
        tracing::info!(user_id = %user.id, "user logged in");
        Ok(user)
    }

    /// Resolve a session token to the current user.
    pub fn current_user(&self, ctx: &CallContext, token: &str) -> Result<User> {
        self.store.user_get(ctx, token).map_err(collapse_auth)
    }

    /// Apply the supplied profile changes and re-issue the session token.
    pub fn update_profile(
        &self,
        ctx: &CallContext,
        token: &str,
        changes: &ProfileUpdate,
    ) -> Result<User> {
        let user = self.current_user(ctx, token)?;

        let mut update = UserUpdate::new();
        if let Some(username) = supplied(&changes.username) {
            update = update.set_username(username)?;
        }
        if let Some(password) = changes.password.as_deref().filter(|p| !p.is_empty()) {
            check_password_pair(password, changes.password_confirm.as_deref().unwrap_or(""))?;
            update = update.set_password(self.security.as_ref(), password)?;
        }
        if let Some(phone) = supplied(&changes.phone) {
            update = update.set_phone(phone)?;
        }

        let saved = self.store.user_save(ctx, &user, &update)?;
        let token = issue_session_token(self.security.as_ref(), &saved.id)?;
        if !update.is_empty() {
            tracing::info!(user_id = %saved.id, ?update, "updated profile");
        }
        Ok(saved.with_token(token))
    }

    /// Store a note and text it to its author.
    ///
    /// If delivery fails the note stays stored and the error carries its id.
    pub fn create_note(&self, ctx: &CallContext, token: &str, text: &str) -> Result<Note> {
        if text.trim().is_empty() {
            return Err(SmsNoteError::Validation("Note cannot be empty".to_string()));
        }
        let user = self.current_user(ctx, token)?;
        let note = self.store.note_create(ctx, &user, text)?;

        if let Err(err) = self.sms.send(ctx, &user.phone, &note.text) {
            tracing::warn!(user_id = %user.id, note_id = %note.id, error = %err, "sms delivery failed");
            return Err(SmsNoteError::Delivery {
                note_id: note.id.to_string(),
                message: err.to_string(),
            });
        }
        Ok(note)
    }

    /// Capture an inbound SMS as a note of the user owning the sender number.
    pub fn inbound_sms(&self, ctx: &CallContext, payload: &[u8]) -> Result<Note> {
        let message = self.sms.parse_inbound(payload)?;
        let phone = normalize_phone(&message.from)?;
        let user = self.store.user_get_by_number(ctx, &phone)?;
        let note = self.store.note_create(ctx, &user, &message.text)?;
        tracing::debug!(user_id = %user.id, note_id = %note.id, "captured inbound sms");
        Ok(note)
    }

    /// One page of the user's notes, newest first. `page` is zero-based.
    pub fn list_notes(&self, ctx: &CallContext, token: &str, page: usize) -> Result<NotePage> {
        let user = self.current_user(ctx, token)?;
        self.store
            .note_list(ctx, &user, page, self.config.page_size)
    }

    pub fn latest_note(&self, ctx: &CallContext, token: &str) -> Result<Option<Note>> {
        let user = self.current_user(ctx, token)?;
        self.store.note_latest(ctx, &user)
    }

    /// Latest note created within the configured recent window.
    pub fn recent_note(&self, ctx: &CallContext, token: &str) -> Result<Option<Note>> {
        let user = self.current_user(ctx, token)?;
        self.store
            .note_latest_within(ctx, &user, self.config.recent_window)
    }

    /// Send a password-reset link to the user's phone.
    pub fn forgot_password(&self, ctx: &CallContext, username: &str) -> Result<()> {
        self.send_reset_link(ctx, username).map_err(|err| {
            tracing::debug!(error = %err, "password reset request rejected");
            SmsNoteError::ResetFailed
        })
    }

    fn send_reset_link(&self, ctx: &CallContext, username: &str) -> Result<()> {
        let user = self.store.user_get_by_username(ctx, username.trim())?;

        let mut claims = Claims::new();
        claims.insert(CLAIM_USER_ID.to_string(), Value::from(user.id.as_str()));
        claims.insert(CLAIM_TIME.to_string(), Value::from(self.clock.now().timestamp()));
        claims.insert(CLAIM_KIND.to_string(), Value::from(KIND_RESET));
        claims.insert(
            CLAIM_STAMP.to_string(),
            Value::from(password_stamp(user.password_hash())),
        );
        let token = self.security.issue_token(&claims)?;

        let link = self.config.reset_link.replace(TOKEN_PLACEHOLDER, &token);
        self.sms
            .send(ctx, &user.phone, &format!("{}{}", RESET_MESSAGE, link))?;
        tracing::info!(user_id = %user.id, "sent password reset link");
        Ok(())
    }

    /// Complete a password reset and return the user with a session token.
    pub fn reset_password(
        &self,
        ctx: &CallContext,
        reset_token: &str,
        password: &str,
        password_confirm: &str,
    ) -> Result<User> {
        self.apply_reset(ctx, reset_token, password, password_confirm)
            .map_err(|err| {
                tracing::debug!(error = %err, "password reset rejected");
                SmsNoteError::ResetFailed
            })
    }

    fn apply_reset(
        &self,
        ctx: &CallContext,
        reset_token: &str,
        password: &str,
        password_confirm: &str,
    ) -> Result<User> {
        let claims = self.security.parse_token(reset_token)?;
        if claims.get(CLAIM_KIND).and_then(Value::as_str) != Some(KIND_RESET) {
            return Err(SmsNoteError::Token);
        }
        let user_id = claims
            .get(CLAIM_USER_ID)
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(UserId::from)
            .ok_or(SmsNoteError::Token)?;
        let issued_at = claims
            .get(CLAIM_TIME)
            .and_then(Value::as_i64)
            .ok_or(SmsNoteError::Token)?;
        let stamp = claims
            .get(CLAIM_STAMP)
            .and_then(Value::as_str)
            .ok_or(SmsNoteError::Token)?;

        let age = self.clock.now().timestamp().saturating_sub(issued_at);
        if age > self.config.reset_window.num_seconds() {
            return Err(SmsNoteError::Token);
        }

        let session = issue_session_token(self.security.as_ref(), &user_id)?;
        let user = self.store.user_get(ctx, &session)?;
        if password_stamp(user.password_hash()) != stamp {
            return Err(SmsNoteError::Token);
        }

        check_password_pair(password, password_confirm)?;
        let update = UserUpdate::new().set_password(self.security.as_ref(), password)?;
        let saved = self.store.user_save(ctx, &user, &update)?;
        tracing::info!(user_id = %saved.id, "password reset");
        Ok(saved.with_token(session))
    }

    /// The user and every note they own, oldest first.
    pub fn export_all(&self, ctx: &CallContext, token: &str) -> Result<(User, Vec<Note>)> {
        let user = self.current_user(ctx, token)?;
        let notes = self.store.user_export_all(ctx, &user)?;
        Ok((user, notes))
    }

    /// Delete every note of the user and then the user.
    pub fn erase_all(&self, ctx: &CallContext, token: &str) -> Result<()> {
        let user = self.current_user(ctx, token)?;
        self.store.user_erase_all(ctx, &user)?;
        tracing::info!(user_id = %user.id, "erased account");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServiceConfig::default();
        config.validate().unwrap();
        assert_eq!(config.page_size, 20);
        assert_eq!(config.reset_window, Duration::minutes(5));
    }

    #[test]
    fn test_reset_link_requires_placeholder() {
        let config = ServiceConfig {
            reset_link: "https://example.invalid/reset".to_string(),
            ..ServiceConfig::default()
        };
        assert!(matches!(config.validate(), Err(SmsNoteError::Validation(_))));
    }

    #[test]
    fn test_password_pair() {
        assert!(check_password_pair("hunter2", "hunter2").is_ok());
        assert!(check_password_pair("hunter2", "hunter3").is_err());
        assert!(check_password_pair("", "").is_err());
    }

    #[test]
    fn test_collapse_hides_login_step() {
        assert!(matches!(
            collapse_auth(SmsNoteError::NotFound("user x".to_string())),
            SmsNoteError::AuthenticationFailed
        ));
        assert!(matches!(
            collapse_auth(SmsNoteError::Credentials),
            SmsNoteError::AuthenticationFailed
        ));
        assert!(matches!(
            collapse_auth(SmsNoteError::Conflict("x".to_string())),
            SmsNoteError::Conflict(_)
        ));
    }

    #[test]
    fn test_profile_update_debug_hides_password() {
        let changes = ProfileUpdate {
            password: Some("hunter2".to_string()),
            ..ProfileUpdate::default()
        };
        assert!(!format!("{:?}", changes).contains("hunter2"));
    }
}
