//! Error types for SMS Note core operations.
//!
//! This module defines the error hierarchy for all core operations.
//! Backends report precise errors (`NotFound` vs `Credentials`); the service
//! layer collapses the ones that would enable account enumeration before they
//! reach a caller.

use thiserror::Error;

/// Result type alias for SMS Note operations.
pub type Result<T> = std::result::Result<T, SmsNoteError>;

/// Core error type for SMS Note operations.
#[derive(Debug, Error)]
pub enum SmsNoteError {
    /// Malformed or missing input (password mismatch, invalid phone number)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown username, phone number or token subject
    #[error("Not found: {0}")]
    NotFound(String),

    /// Password did not match the stored hash
    #[error("Invalid credentials")]
    Credentials,

    /// Generic authentication failure reported to callers
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// Username or phone number already taken
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Unparseable, forged or expired signed token
    #[error("Invalid or expired token")]
    Token,

    /// Any failure of the password-reset protocol
    #[error("Password reset failed")]
    ResetFailed,

    /// Hashing or signing failure
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Note was persisted but SMS delivery failed
    #[error("Delivery of note {note_id} failed: {message}")]
    Delivery { note_id: String, message: String },

    /// Storage backend error (generic)
    #[error("Storage error: {0}")]
    Storage(String),

    /// SQLite-specific storage error
    #[error("SQLite error: {source}")]
    Sqlite {
        #[from]
        source: rusqlite::Error,
    },

    /// I/O error
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    /// The caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// The caller's deadline passed before the operation finished
    #[error("Deadline exceeded")]
    DeadlineExceeded,
}

impl SmsNoteError {
    /// True for the errors a login flow must not distinguish to its caller.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            SmsNoteError::NotFound(_)
                | SmsNoteError::Credentials
                | SmsNoteError::Token
                | SmsNoteError::AuthenticationFailed
        )
    }

    /// True for backend failures that should surface as an opaque internal error.
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            SmsNoteError::Storage(_)
                | SmsNoteError::Sqlite { .. }
                | SmsNoteError::Io { .. }
                | SmsNoteError::Json { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_failures_are_grouped() {
        assert!(SmsNoteError::NotFound("user".to_string()).is_auth_failure());
        assert!(SmsNoteError::Credentials.is_auth_failure());
        assert!(SmsNoteError::Token.is_auth_failure());
        assert!(!SmsNoteError::Conflict("username".to_string()).is_auth_failure());
    }

    #[test]
    fn test_generic_messages_leak_nothing() {
        assert_eq!(SmsNoteError::Token.to_string(), "Invalid or expired token");
        assert_eq!(SmsNoteError::ResetFailed.to_string(), "Password reset failed");
        assert_eq!(
            SmsNoteError::AuthenticationFailed.to_string(),
            "Authentication failed"
        );
    }

    #[test]
    fn test_io_maps_to_backend() {
        let err: SmsNoteError = std::io::Error::other("disk gone").into();
        assert!(err.is_backend());
    }
}
