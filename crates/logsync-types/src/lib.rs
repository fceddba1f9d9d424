//! Foundation types for logsync.
//!
//! logsync bridges append-only replicated logs with a revisioned document
//! store. Every other logsync crate depends on `logsync-types`.
//!
//! # Key Types
//!
//! - [`LogId`]: Stable binary identity of a log, rendered as lowercase hex
//! - [`DerivedKey`]: `"<log-hex>@<seq>"` document key for log-ingested entries
//! - [`DocKey`]: Document key as seen by the store
//! - [`Revision`]: Store-assigned `"<generation>-<digest>"` revision token
//! - [`Document`]: Keyed, revisioned JSON body

pub mod document;
pub mod error;
pub mod identity;
pub mod revision;

pub use document::{DerivedKey, DocKey, Document, LOG_KEY_FIELD, LOG_SEQ_FIELD};
pub use error::TypeError;
pub use identity::LogId;
pub use revision::Revision;
