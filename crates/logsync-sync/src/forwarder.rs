use std::collections::HashSet;
use std::sync::Arc;

use logsync_log::{LiveLog, Log};
use logsync_store::{DocumentStore, Lookup, WriteMode, WriteResult};
use logsync_types::{DocKey, Document};
use tracing::debug;

use crate::codec::encode_document;
use crate::error::{SyncError, SyncResult};

/// Local write path that mirrors successful writes into the owned log.
///
/// The store write happens first; only documents it reports as written are
/// re-read (to pick up the assigned revision) and appended, one entry per
/// document, in request order. A failed store write appends nothing. A failed
/// append leaves the store write in place and surfaces as
/// [`SyncError::Append`].
#[derive(Clone)]
pub struct Forwarder {
    store: Arc<dyn DocumentStore>,
    log: Arc<dyn LiveLog>,
}

impl Forwarder {
    pub fn new(store: Arc<dyn DocumentStore>, log: Arc<dyn LiveLog>) -> Self {
        Self { store, log }
    }

    pub async fn bulk_write(&self, docs: Vec<Document>) -> SyncResult<Vec<WriteResult>> {
        let requested: Vec<DocKey> = docs.iter().map(|doc| doc.key.clone()).collect();
        let results = self.store.bulk_write(docs, WriteMode::NewEdits).await?;

        let written: HashSet<&DocKey> = results
            .iter()
            .filter(|result| result.revision().is_some())
            .map(|result| &result.key)
            .collect();

        let mut forwarded = HashSet::new();
        for key in &requested {
            if !written.contains(key) || !forwarded.insert(key) {
                continue;
            }
            let doc = match self.store.get(key, None).await? {
                Lookup::Found(doc) => doc,
                Lookup::NotFound => return Err(SyncError::VanishedAfterWrite(key.clone())),
            };
            let payload = encode_document(&doc)?;
            let seq = self
                .log
                .append(payload)
                .await
                .map_err(|source| SyncError::Append {
                    key: key.clone(),
                    source,
                })?;
            debug!(%key, seq, log = %self.log.id(), "forwarded");
        }

        Ok(results)
    }
}

impl std::fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forwarder")
            .field("log", &self.log.id())
            .finish_non_exhaustive()
    }
}
