//! # SMS Note Core
//!
//! Core library for SMS Note: send yourself a note by text message.
//!
//! This crate holds identity, note persistence and the password-reset
//! protocol, independent of any front end.
//!
//! ## Architecture
//!
//! - **security**: Argon2id password hashes and HS256 signed tokens
//! - **storage**: the `NoteStore` contract with SQLite and document backends
//! - **service**: registration, login, notes and password reset
//! - **sms**: SMS delivery seam
//! - **export**: portable exports and the atomic export writer
//! - **context**: per-call deadlines and cancellation

pub mod clock;
pub mod context;
pub mod error;
pub mod export;
pub mod fs;
pub mod phone;
pub mod security;
pub mod service;
pub mod sms;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use context::{CallContext, CancelHandle};
pub use error::{Result, SmsNoteError};
pub use export::{write_export, ExportFormat, Exporter, JsonExporter};
pub use security::{HashCost, Security, StandardSecurity};
pub use service::{NoteService, ProfileUpdate, ServiceConfig};
pub use sms::{InboundMessage, LogGateway, SmsGateway};
pub use storage::{
    DocumentNoteStore, Note, NoteId, NotePage, NoteStore, SqliteStore, User, UserId, UserUpdate,
};

/// Core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
