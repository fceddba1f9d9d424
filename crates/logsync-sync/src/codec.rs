//! Translation between log entries and store documents.
//!
//! A payload that is itself a forwarded document (an object carrying `_id`
//! and a well-formed `_rev`) keeps its identity, so a store replaying its own
//! owned log finds every entry already present. Any other object payload is
//! keyed by its position, `"<log-hex>@<seq>"`, and tagged with the reserved
//! `_key` and `_seq` fields.

use bytes::Bytes;
use logsync_log::RawEntry;
use logsync_store::WriteMode;
use logsync_types::{DerivedKey, Document, LogId, Revision, LOG_KEY_FIELD, LOG_SEQ_FIELD};
use serde_json::Value;

use crate::error::{SyncError, SyncResult};

const ID_FIELD: &str = "_id";
const REV_FIELD: &str = "_rev";

/// Where a candidate document's identity came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Origin {
    /// A document forwarded by some store; identity is `(_id, _rev)`.
    Forwarded { seq: u64 },
    /// A plain payload keyed by its log position.
    Derived(DerivedKey),
}

/// A decoded log entry ready for the applier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub doc: Document,
    pub origin: Origin,
}

impl Candidate {
    /// Bulk-write mode that stores this candidate without altering it.
    pub fn write_mode(&self) -> WriteMode {
        match self.origin {
            Origin::Forwarded { .. } => WriteMode::Replicate,
            Origin::Derived(_) => WriteMode::NewEdits,
        }
    }
}

/// Decode one raw entry of `log`.
pub fn decode_entry(log: &LogId, entry: &RawEntry) -> SyncResult<Candidate> {
    let decode_error = |reason: String| SyncError::Decode {
        log: log.clone(),
        seq: entry.seq,
        reason,
    };

    let value: Value =
        serde_json::from_slice(&entry.payload).map_err(|e| decode_error(e.to_string()))?;
    let Value::Object(mut body) = value else {
        return Err(decode_error("payload is not a JSON object".into()));
    };

    if let Some((key, rev)) = forwarded_identity(&body) {
        body.remove(ID_FIELD);
        body.remove(REV_FIELD);
        let doc = Document::new(key, body).with_rev(rev);
        return Ok(Candidate {
            doc,
            origin: Origin::Forwarded { seq: entry.seq },
        });
    }

    let derived = DerivedKey::new(log.clone(), entry.seq);
    body.remove(ID_FIELD);
    body.remove(REV_FIELD);
    body.insert(LOG_KEY_FIELD.into(), Value::String(log.to_hex()));
    body.insert(LOG_SEQ_FIELD.into(), Value::from(entry.seq));
    Ok(Candidate {
        doc: Document::new(derived.clone(), body),
        origin: Origin::Derived(derived),
    })
}

fn forwarded_identity(body: &serde_json::Map<String, Value>) -> Option<(String, Revision)> {
    let key = body.get(ID_FIELD)?.as_str()?;
    let rev = body.get(REV_FIELD)?.as_str()?.parse().ok()?;
    Some((key.to_string(), rev))
}

/// Encode a stored document as a log payload.
pub fn encode_document(doc: &Document) -> SyncResult<Bytes> {
    doc.to_json()
        .map(Bytes::from)
        .map_err(|e| SyncError::Store(e.into()))
}
