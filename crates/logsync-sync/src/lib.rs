//! Replication engine for logsync.
//!
//! Bridges append-only logs and a revisioned document store in both
//! directions:
//!
//! - **Followers** turn every entry of a followed log into a store document,
//!   idempotently, so logs can be replayed from the start at any time.
//! - The **forwarder** mirrors every successful local write into the single
//!   owned log, making that log the replication transport for the store.
//! - **Aggregate discovery** follows every log a log-of-logs announces,
//!   including logs that appear later.
//! - **Teardown** stops every follower and waits for each one to close
//!   while the underlying store is destroyed.
//!
//! [`SyncedStore`] is the entry point.

pub mod aggregate;
pub mod applier;
pub mod codec;
pub mod config;
pub mod error;
pub mod follower;
pub mod forwarder;
pub mod replica;

pub use applier::{ApplyOutcome, Applier};
pub use codec::{Candidate, Origin};
pub use config::{EntryErrorPolicy, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use follower::{FollowerState, FollowerStatus, StreamHandle};
pub use forwarder::Forwarder;
pub use replica::SyncedStore;
