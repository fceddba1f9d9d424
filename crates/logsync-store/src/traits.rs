use async_trait::async_trait;
use logsync_types::{DocKey, Document, Revision};

use crate::error::StoreResult;

/// Outcome of a point lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lookup {
    Found(Document),
    NotFound,
}

impl Lookup {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn into_document(self) -> Option<Document> {
        match self {
            Self::Found(doc) => Some(doc),
            Self::NotFound => None,
        }
    }
}

/// How a bulk write treats the revisions carried by the input documents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WriteMode {
    /// Local edits. A document without a revision creates a new key; a
    /// document with a revision must name the current head and receives a
    /// freshly computed successor revision.
    #[default]
    NewEdits,
    /// Replicated documents. Every input must carry its revision, which is
    /// stored verbatim; a revision already present is accepted as a no-op.
    Replicate,
}

/// Per-document result of a bulk write, in input order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteResult {
    pub key: DocKey,
    pub status: WriteStatus,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteStatus {
    /// The document is stored at this revision.
    Written(Revision),
    /// The write was refused because it would overwrite another revision.
    Conflict { reason: String },
}

impl WriteResult {
    pub fn revision(&self) -> Option<&Revision> {
        match &self.status {
            WriteStatus::Written(rev) => Some(rev),
            WriteStatus::Conflict { .. } => None,
        }
    }
}

/// Revisioned document store.
///
/// Implementations must satisfy these invariants:
/// - `(key, revision)` uniquely identifies a document value.
/// - Writes never silently overwrite; they create a key or add a revision.
/// - Concurrent calls are safe; the store serializes its own writes.
/// - All backend errors are propagated, never silently ignored.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a document, either its winning revision or the exact `rev`.
    async fn get(&self, key: &DocKey, rev: Option<&Revision>) -> StoreResult<Lookup>;

    /// Write a batch of documents. Results are returned in input order.
    async fn bulk_write(&self, docs: Vec<Document>, mode: WriteMode)
        -> StoreResult<Vec<WriteResult>>;

    /// Winning revision of every document, ordered by key.
    async fn all_docs(&self) -> StoreResult<Vec<Document>>;

    /// Drop all data. Further operations fail with `StoreError::Destroyed`.
    async fn destroy(&self) -> StoreResult<()>;
}
