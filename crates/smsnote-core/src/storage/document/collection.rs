//! Schemaless document collections on the local filesystem.
//!
//! ## Layout
//!
//! ```text
//! <root>/
//! ├── users/
//! │   └── <id>.json
//! └── notes/
//!     └── <id>.json
//! ```
//!
//! Documents are JSON objects written atomically (temp file + rename). There
//! are no secondary indexes and no unique constraints: queries scan the
//! collection. The conditional writes are [`DocumentStore::create`], which
//! fails if a document with the same id already exists, and
//! [`DocumentStore::delete_if_eq`], which only deletes unchanged content.

use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;
use uuid::Uuid;

use crate::error::{Result, SmsNoteError};
use crate::fs::{create_exclusive, write_atomic};

/// A stored document and its id.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
enum Filter {
    Eq(String, Value),
    Gte(String, Value),
}

impl Filter {
    fn matches(&self, data: &Value) -> bool {
        match self {
            Filter::Eq(field, expected) => data.get(field) == Some(expected),
            Filter::Gte(field, bound) => data
                .get(field)
                .and_then(|value| compare_values(value, bound))
                .is_some_and(|ord| ord != Ordering::Less),
        }
    }
}

/// A filtered, ordered read over one collection.
#[derive(Debug, Clone)]
pub struct Query {
    collection: String,
    filters: Vec<Filter>,
    order_by: Option<(String, Direction)>,
    offset: usize,
    limit: Option<usize>,
}

impl Query {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            order_by: None,
            offset: 0,
            limit: None,
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(field.into(), value.into()));
        self
    }

    pub fn where_gte(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Gte(field.into(), value.into()));
        self
    }

    /// Order by a field; documents with equal values are ordered by id in the
    /// same direction, so the order is total.
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Order two JSON scalars of the same kind.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Collection names and document ids are limited to `[A-Za-z0-9_-]{1,128}`.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 128
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn validate_name(kind: &str, name: &str) -> Result<()> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(SmsNoteError::Storage(format!("Invalid {} name: {:?}", kind, name)))
    }
}

/// Filesystem document store.
#[derive(Debug)]
pub struct DocumentStore {
    root: PathBuf,
    // Serializes calls within this process; each call is atomic on its own.
    lock: Mutex<()>,
}

impl DocumentStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// A fresh store-generated document id.
    ///
    /// Ids are UUID v7 in lowercase hex, so within one process they sort in
    /// creation order and break ties between equal sort keys.
    pub fn new_id() -> String {
        Uuid::now_v7().simple().to_string()
    }

    fn guard(&self) -> Result<MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| SmsNoteError::Storage("Document store lock poisoned".to_string()))
    }

    fn collection_dir(&self, collection: &str) -> Result<PathBuf> {
        validate_name("collection", collection)?;
        let dir = self.root.join(collection);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    fn document_path(&self, collection: &str, id: &str) -> Result<PathBuf> {
        validate_name("document id", id)?;
        Ok(self.collection_dir(collection)?.join(format!("{}.json", id)))
    }

    fn read_document(path: &Path) -> Result<Option<Value>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Store `data` under a new id and return the id.
    pub fn insert(&self, collection: &str, data: &Value) -> Result<String> {
        let id = Self::new_id();
        if self.create(collection, &id, data)? {
            Ok(id)
        } else {
            Err(SmsNoteError::Storage(format!(
                "Document id collision in {}",
                collection
            )))
        }
    }

    /// Store `data` under `id` only if no such document exists.
    pub fn create(&self, collection: &str, id: &str, data: &Value) -> Result<bool> {
        let path = self.document_path(collection, id)?;
        let bytes = serde_json::to_vec(data)?;
        let _guard = self.guard()?;
        Ok(create_exclusive(&path, &bytes)?)
    }

    /// Create or replace the document `id`.
    pub fn set(&self, collection: &str, id: &str, data: &Value) -> Result<()> {
        let path = self.document_path(collection, id)?;
        let bytes = serde_json::to_vec(data)?;
        let _guard = self.guard()?;
        write_atomic(&path, &bytes)?;
        Ok(())
    }

    pub fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let path = self.document_path(collection, id)?;
        let _guard = self.guard()?;
        Self::read_document(&path)
    }

    /// Delete the document `id`. Returns false if it did not exist.
    pub fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let path = self.document_path(collection, id)?;
        let _guard = self.guard()?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Delete the document `id` only if it still holds `expected`.
    ///
    /// Returns false if the document is gone or has changed.
    pub fn delete_if_eq(&self, collection: &str, id: &str, expected: &Value) -> Result<bool> {
        let path = self.document_path(collection, id)?;
        let _guard = self.guard()?;
        if Self::read_document(&path)?.as_ref() != Some(expected) {
            return Ok(false);
        }
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    pub fn query(&self, query: &Query) -> Result<Vec<Document>> {
        let dir = self.collection_dir(&query.collection)?;
        let _guard = self.guard()?;

        let mut documents = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let Some(id) = path
                .file_name()
                .and_then(|name| name.to_str())
                .filter(|name| !name.starts_with('.'))
                .and_then(|name| name.strip_suffix(".json"))
            else {
                continue;
            };
            let id = id.to_string();
            // Deleted between listing and reading.
            let Some(data) = Self::read_document(&path)? else {
                continue;
            };
            if query.filters.iter().all(|filter| filter.matches(&data)) {
                documents.push(Document { id, data });
            }
        }

        if let Some((field, direction)) = &query.order_by {
            documents.sort_by(|a, b| {
                let ord = match (a.data.get(field), b.data.get(field)) {
                    (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
                    (Some(_), None) => Ordering::Greater,
                    (None, Some(_)) => Ordering::Less,
                    (None, None) => Ordering::Equal,
                }
                .then_with(|| a.id.cmp(&b.id));
                match direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                }
            });
        } else {
            documents.sort_by(|a, b| a.id.cmp(&b.id));
        }

        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(documents
            .into_iter()
            .skip(query.offset)
            .take(limit)
            .collect())
    }
}
