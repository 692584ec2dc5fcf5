//! Data portability exports.

use std::path::Path;
use std::str::FromStr;

use serde_json::{json, Value};

use crate::error::{Result, SmsNoteError};
use crate::fs::write_atomic;
use crate::storage::{Note, User};

/// Turns a user and their notes into a portable document.
pub trait Exporter: Send + Sync {
    fn export(&self, user: &User, notes: &[Note]) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    /// One pretty-printed JSON document
    #[default]
    Json,
    /// One JSON object per line: the user first, then each note
    Jsonl,
}

impl FromStr for ExportFormat {
    type Err = SmsNoteError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(ExportFormat::Json),
            "jsonl" => Ok(ExportFormat::Jsonl),
            other => Err(SmsNoteError::Validation(format!(
                "Unsupported export format: {} (use json or jsonl)",
                other
            ))),
        }
    }
}

/// JSON exporter. Never includes the password hash.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonExporter {
    pub format: ExportFormat,
}

impl JsonExporter {
    pub fn new(format: ExportFormat) -> Self {
        Self { format }
    }
}

/// Portable JSON view of a user. Never includes the password hash.
pub fn user_json(user: &User) -> Value {
    json!({
        "id": user.id,
        "username": user.username,
        "phone": user.phone,
        "created_at": user.created_at.to_rfc3339(),
    })
}

pub fn note_json(note: &Note) -> Value {
    json!({
        "id": note.id,
        "text": note.text,
        "short": note.short(),
        "created_at": note.created_at.to_rfc3339(),
    })
}

impl Exporter for JsonExporter {
    fn export(&self, user: &User, notes: &[Note]) -> Result<Vec<u8>> {
        match self.format {
            ExportFormat::Json => {
                let document = json!({
                    "user": user_json(user),
                    "notes": notes.iter().map(note_json).collect::<Vec<_>>(),
                });
                let mut bytes = serde_json::to_vec_pretty(&document)?;
                bytes.push(b'\n');
                Ok(bytes)
            }
            ExportFormat::Jsonl => {
                let mut bytes = Vec::new();
                serde_json::to_writer(&mut bytes, &user_json(user))?;
                bytes.push(b'\n');
                for note in notes {
                    serde_json::to_writer(&mut bytes, &note_json(note))?;
                    bytes.push(b'\n');
                }
                Ok(bytes)
            }
        }
    }
}

/// Write an export to `path` through a private temp file.
///
/// The temp file is removed on every exit path; the destination is either the
/// complete export or untouched.
pub fn write_export(path: &Path, bytes: &[u8]) -> Result<()> {
    write_atomic(path, bytes)?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "export: written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{NoteId, UserId};
    use chrono::Utc;
    use tempfile::tempdir;

    fn sample() -> (User, Vec<Note>) {
        let user = User::new(
            UserId::from("1"),
            "alice".to_string(),
            "+12015550123".to_string(),
            "$argon2id$secret".to_string(),
            Utc::now(),
        );
        let notes = vec![Note {
            id: NoteId::new("10"),
            user_id: UserId::from("1"),
            text: "hello".to_string(),
            created_at: Utc::now(),
        }];
        (user, notes)
    }

    #[test]
    fn test_json_export_omits_hash() {
        let (user, notes) = sample();
        let bytes = JsonExporter::default().export(&user, &notes).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(!text.contains("argon2"));

        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["user"]["username"], "alice");
        assert_eq!(value["notes"][0]["text"], "hello");
    }

    #[test]
    fn test_jsonl_export_has_one_line_per_record() {
        let (user, notes) = sample();
        let bytes = JsonExporter::new(ExportFormat::Jsonl)
            .export(&user, &notes)
            .unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap().lines().count(), 2);
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("jsonl".parse::<ExportFormat>().unwrap(), ExportFormat::Jsonl);
        assert!("csv".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_write_export_leaves_only_destination() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("export.json");
        write_export(&dest, b"{}").unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"{}");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&dest).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_write_export_failure_leaves_nothing() {
        let dir = tempdir().unwrap();
        // Destination is a directory, so the final rename fails.
        let dest = dir.path().join("taken");
        std::fs::create_dir(&dest).unwrap();
        std::fs::write(dest.join("keep"), b"x").unwrap();
        assert!(write_export(&dest, b"{}").is_err());
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("taken")]);
    }
}
