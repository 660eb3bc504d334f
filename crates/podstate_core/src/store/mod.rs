//! Document store contract and local implementation.
//!
//! # Responsibility
//! - Define the document database seam (`DocumentStore`) used by the record
//!   client and mutator.
//! - Provide live collection listeners that receive the full snapshot on
//!   every change.
//!
//! # Invariants
//! - A listener receives the current snapshot on registration and after every
//!   committed change to its collection, in commit order.
//! - Once a registration is removed (or dropped) its listener is not called
//!   again.
//! - An `Err` delivered to a listener terminates that listener.

use crate::db::DbError;
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub mod path;
mod sqlite;

pub use path::{partition_path, CollectionPath, DocumentPath};
pub use sqlite::SqliteDocumentStore;

/// Top-level fields of one document.
pub type Fields = Map<String, Value>;

pub type StoreResult<T> = Result<T, StoreError>;

/// Callback invoked with each snapshot, or once with the terminating error.
pub type SnapshotListener = Arc<dyn Fn(StoreResult<QuerySnapshot>) + Send + Sync>;

#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    InvalidPath(String),
    Encoding(serde_json::Error),
    /// Stored bytes are not a JSON object.
    Corrupt { document: String, message: String },
    PermissionDenied(String),
    /// The live query could not be served; carries the underlying message.
    Listen(String),
    Unavailable(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidPath(path) => write!(f, "invalid document path: `{path}`"),
            Self::Encoding(err) => write!(f, "document encoding failed: {err}"),
            Self::Corrupt { document, message } => {
                write!(f, "corrupt document `{document}`: {message}")
            }
            Self::PermissionDenied(message) => write!(f, "permission denied: {message}"),
            Self::Listen(message) => write!(f, "snapshot listener failed: {message}"),
            Self::Unavailable(message) => write!(f, "store unavailable: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Encoding(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Encoding(value)
    }
}

/// One document as read from a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    pub id: String,
    pub fields: Fields,
}

/// Every document of one collection, in store order.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySnapshot {
    pub collection: CollectionPath,
    pub documents: Vec<DocumentSnapshot>,
}

/// How `set_document` treats fields not named in the write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// The document becomes exactly the written fields.
    Replace,
    /// Named top-level fields are overwritten; others are preserved. Creates
    /// the document when missing.
    Merge,
}

/// Document database seam.
pub trait DocumentStore: Send + Sync {
    /// Inserts a document under a store-assigned id and returns that id.
    fn add_document(&self, collection: &CollectionPath, fields: Fields) -> StoreResult<String>;

    /// Writes one document at a known path.
    fn set_document(
        &self,
        document: &DocumentPath,
        fields: Fields,
        mode: WriteMode,
    ) -> StoreResult<()>;

    /// Deletes one document. Deleting a missing document succeeds.
    fn delete_document(&self, document: &DocumentPath) -> StoreResult<()>;

    /// Reads the collection once.
    fn list_documents(&self, collection: &CollectionPath) -> StoreResult<Vec<DocumentSnapshot>>;

    /// Registers a live listener on a collection.
    ///
    /// Listeners run on the writer's thread and must not write back into the
    /// store from inside the callback.
    fn on_snapshot(
        &self,
        collection: &CollectionPath,
        listener: SnapshotListener,
    ) -> StoreResult<ListenerRegistration>;
}

/// Handle that detaches a listener when removed or dropped.
pub struct ListenerRegistration {
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl ListenerRegistration {
    pub fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// Registration for a listener that is already terminated.
    pub fn detached() -> Self {
        Self { detach: None }
    }

    /// Detaches the listener now.
    pub fn remove(mut self) {
        self.run_detach();
    }

    fn run_detach(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        self.run_detach();
    }
}

impl std::fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("attached", &self.detach.is_some())
            .finish()
    }
}
