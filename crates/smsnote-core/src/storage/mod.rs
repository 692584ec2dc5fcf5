//! Storage abstractions and backends.
//!
//! - **traits**: the `NoteStore` persistence contract
//! - **types**: users, notes, pages and validated updates
//! - **sqlite**: relational backend
//! - **document**: filesystem document-store backend

pub mod document;
pub mod sqlite;
pub mod traits;
pub mod types;

pub use document::{DocumentNoteStore, DocumentStore};
pub use sqlite::SqliteStore;
pub use traits::NoteStore;
pub use types::{
    normalize_username, preview, Note, NoteId, NotePage, User, UserId, UserUpdate,
    MAX_USERNAME_CHARS, PREVIEW_CHARS,
};
