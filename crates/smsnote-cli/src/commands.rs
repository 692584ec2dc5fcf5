//! Command handlers, one module per area.

pub mod account;
pub mod data;
pub mod init;
pub mod misc;
pub mod notes;
pub mod recovery;
