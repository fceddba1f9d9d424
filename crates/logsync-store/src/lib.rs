//! Revisioned document storage for logsync.
//!
//! This crate defines the boundary logsync needs from a document store and
//! ships an in-memory backend used by tests, the CLI demo, and embedders.
//!
//! # Design Rules
//!
//! 1. A write either creates a document or appends a revision; it never
//!    silently overwrites. `(key, revision)` identifies one body forever.
//! 2. Absence is a value, not an error: [`DocumentStore::get`] returns
//!    [`Lookup::NotFound`]. Every [`StoreError`] is a real fault.
//! 3. Write conflicts are reported per document in [`WriteResult`].

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryDocumentStore;
pub use traits::{DocumentStore, Lookup, WriteMode, WriteResult, WriteStatus};
