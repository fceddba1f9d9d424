use std::sync::Arc;

use logsync_store::{DocumentStore, Lookup, StoreError, WriteStatus};
use logsync_types::Revision;
use tracing::debug;

use crate::codec::Candidate;
use crate::error::SyncResult;

/// Result of applying one candidate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The document already existed at this identity; nothing was written.
    Skipped,
    /// The document was inserted at this revision.
    Inserted(Revision),
    /// The store refused the insert because another revision holds the key.
    Conflict(String),
}

/// Idempotent insert of log-derived documents.
///
/// Performs at most one store write per call: a lookup at the candidate's
/// identity, then a single-document bulk write only if the lookup reports
/// the document missing. Store faults propagate.
#[derive(Clone)]
pub struct Applier {
    store: Arc<dyn DocumentStore>,
}

impl Applier {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn apply(&self, candidate: Candidate) -> SyncResult<ApplyOutcome> {
        let key = candidate.doc.key.clone();
        let lookup = self.store.get(&key, candidate.doc.rev.as_ref()).await?;
        if let Lookup::Found(_) = lookup {
            debug!(%key, "already present, skipping");
            return Ok(ApplyOutcome::Skipped);
        }

        let mode = candidate.write_mode();
        let mut results = self.store.bulk_write(vec![candidate.doc], mode).await?;
        let result = results
            .pop()
            .ok_or_else(|| StoreError::Backend(format!("bulk write returned no result for {key}")))?;

        Ok(match result.status {
            WriteStatus::Written(rev) => {
                debug!(%key, %rev, "inserted");
                ApplyOutcome::Inserted(rev)
            }
            WriteStatus::Conflict { reason } => {
                debug!(%key, %reason, "insert refused");
                ApplyOutcome::Conflict(reason)
            }
        })
    }
}

impl std::fmt::Debug for Applier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Applier").finish_non_exhaustive()
    }
}
