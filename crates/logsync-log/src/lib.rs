//! Append-only log boundary for logsync.
//!
//! A log is a totally ordered, immutable sequence of entries addressed by
//! `(LogId, seq)` with `seq` starting at 0. logsync consumes logs in one of
//! two shapes:
//!
//! - [`LiveLog`]: a native live stream that replays history and then keeps
//!   delivering new entries, plus `append` for writable logs.
//! - [`RandomAccessLog`]: `ready`/`len`/`read_at` plus an "appended"
//!   notification carrying the new length.
//!
//! A [`LogAggregator`] announces a growing set of logs. [`MemoryLog`] and
//! [`MemoryAggregator`] are in-memory implementations for tests and demos.

pub mod aggregator;
pub mod entry;
pub mod error;
pub mod memory;
pub mod traits;

pub use aggregator::MemoryAggregator;
pub use entry::{LiveRead, RawEntry};
pub use error::{LogError, LogResult};
pub use memory::{LogConfig, MemoryLog};
pub use traits::{LiveLog, Log, LogAggregator, LogSource, RandomAccessLog};
