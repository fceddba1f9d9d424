use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use logsync_types::{DocKey, Document, Revision};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::{DocumentStore, Lookup, WriteMode, WriteResult, WriteStatus};

/// In-memory, revision-tracking document store.
///
/// Intended for tests and embedding. Every revision ever written is kept, so
/// lookups at an exact revision keep working after newer edits.
pub struct InMemoryDocumentStore {
    inner: RwLock<StoreState>,
}

#[derive(Default)]
struct StoreState {
    docs: BTreeMap<DocKey, BTreeMap<Revision, Map<String, Value>>>,
    destroyed: bool,
}

impl StoreState {
    fn winner(&self, key: &DocKey) -> Option<(&Revision, &Map<String, Value>)> {
        self.docs.get(key).and_then(|history| history.iter().next_back())
    }

    fn write_one(&mut self, doc: Document, mode: WriteMode) -> WriteResult {
        let key = doc.key.clone();
        let status = match mode {
            WriteMode::NewEdits => self.write_edit(doc),
            WriteMode::Replicate => self.write_replicated(doc),
        };
        WriteResult { key, status }
    }

    fn write_edit(&mut self, doc: Document) -> WriteStatus {
        let head = self.winner(&doc.key).map(|(rev, _)| rev.clone());
        match (head, doc.rev) {
            (None, None) => self.insert_next(doc.key, None, doc.body),
            (Some(head), Some(parent)) if head == parent => {
                self.insert_next(doc.key, Some(&parent), doc.body)
            }
            (Some(head), _) => WriteStatus::Conflict {
                reason: format!("document update conflict: current revision is {head}"),
            },
            (None, Some(parent)) => WriteStatus::Conflict {
                reason: format!("cannot update missing document from revision {parent}"),
            },
        }
    }

    fn write_replicated(&mut self, doc: Document) -> WriteStatus {
        let Some(rev) = doc.rev else {
            return WriteStatus::Conflict {
                reason: "replicated document carries no revision".into(),
            };
        };
        let history = self.docs.entry(doc.key).or_default();
        history.entry(rev.clone()).or_insert(doc.body);
        WriteStatus::Written(rev)
    }

    fn insert_next(
        &mut self,
        key: DocKey,
        parent: Option<&Revision>,
        body: Map<String, Value>,
    ) -> WriteStatus {
        let rev = match Revision::next(parent, &body) {
            Ok(rev) => rev,
            Err(e) => {
                return WriteStatus::Conflict {
                    reason: e.to_string(),
                }
            }
        };
        self.docs.entry(key).or_default().insert(rev.clone(), body);
        WriteStatus::Written(rev)
    }
}

impl InMemoryDocumentStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreState::default()),
        }
    }

    /// Number of distinct document keys.
    pub fn len(&self) -> usize {
        self.inner.read().map(|s| s.docs.len()).unwrap_or(0)
    }

    /// Returns `true` if the store holds no documents.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of revisions stored for `key`.
    pub fn revision_count(&self, key: &DocKey) -> usize {
        self.inner
            .read()
            .map(|s| s.docs.get(key).map(BTreeMap::len).unwrap_or(0))
            .unwrap_or(0)
    }

    /// Returns `true` once [`DocumentStore::destroy`] has completed.
    pub fn is_destroyed(&self) -> bool {
        self.inner.read().map(|s| s.destroyed).unwrap_or(true)
    }

    fn read_state(&self) -> StoreResult<RwLockReadGuard<'_, StoreState>> {
        let state = self
            .inner
            .read()
            .map_err(|_| StoreError::Backend("store read lock poisoned".into()))?;
        if state.destroyed {
            return Err(StoreError::Destroyed);
        }
        Ok(state)
    }

    fn write_state(&self) -> StoreResult<RwLockWriteGuard<'_, StoreState>> {
        let state = self
            .inner
            .write()
            .map_err(|_| StoreError::Backend("store write lock poisoned".into()))?;
        if state.destroyed {
            return Err(StoreError::Destroyed);
        }
        Ok(state)
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, key: &DocKey, rev: Option<&Revision>) -> StoreResult<Lookup> {
        let state = self.read_state()?;
        let found = match rev {
            Some(rev) => state
                .docs
                .get(key)
                .and_then(|history| history.get_key_value(rev)),
            None => state.winner(key),
        };
        Ok(match found {
            Some((rev, body)) => Lookup::Found(Document::new(key.clone(), body.clone()).with_rev(rev.clone())),
            None => Lookup::NotFound,
        })
    }

    async fn bulk_write(
        &self,
        docs: Vec<Document>,
        mode: WriteMode,
    ) -> StoreResult<Vec<WriteResult>> {
        let mut state = self.write_state()?;
        let results: Vec<WriteResult> = docs
            .into_iter()
            .map(|doc| state.write_one(doc, mode))
            .collect();
        debug!(count = results.len(), ?mode, "bulk write applied");
        Ok(results)
    }

    async fn all_docs(&self) -> StoreResult<Vec<Document>> {
        let state = self.read_state()?;
        Ok(state
            .docs
            .keys()
            .filter_map(|key| {
                state
                    .winner(key)
                    .map(|(rev, body)| Document::new(key.clone(), body.clone()).with_rev(rev.clone()))
            })
            .collect())
    }

    async fn destroy(&self) -> StoreResult<()> {
        let mut state = self
            .inner
            .write()
            .map_err(|_| StoreError::Backend("store write lock poisoned".into()))?;
        state.docs.clear();
        state.destroyed = true;
        debug!("document store destroyed");
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryDocumentStore")
            .field("document_count", &self.len())
            .finish()
    }
}
