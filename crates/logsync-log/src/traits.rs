use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use logsync_types::LogId;
use tokio::sync::{broadcast, watch};

use crate::entry::{LiveRead, RawEntry};
use crate::error::LogResult;

/// Anything addressable as a log.
pub trait Log: Send + Sync {
    /// Stable unique identity of this log.
    fn id(&self) -> LogId;
}

/// Log exposing a native live stream.
#[async_trait]
pub trait LiveLog: Log {
    /// Whether `append` is permitted on this replica.
    fn is_writable(&self) -> bool;

    /// Open a live, non-snapshot read starting at sequence 0.
    ///
    /// The stream never ends on its own while the log is open.
    async fn open_live_read(&self) -> LogResult<LiveRead>;

    /// Append a payload and return its sequence number.
    async fn append(&self, payload: Bytes) -> LogResult<u64>;
}

/// Log exposing random-access reads plus an "appended" notification.
#[async_trait]
pub trait RandomAccessLog: Log {
    /// Resolve once the log has loaded its metadata.
    async fn ready(&self) -> LogResult<()>;

    /// Current number of entries.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the entry at `seq`. With `blocking`, waits for it to be appended
    /// instead of failing with `OutOfRange`.
    async fn read_at(&self, seq: u64, blocking: bool) -> LogResult<RawEntry>;

    /// Watch the log length; it changes after every append.
    fn appended(&self) -> watch::Receiver<u64>;
}

/// A log handed to a follower, tagged with the shape it will be read in.
#[derive(Clone)]
pub enum LogSource {
    Live(Arc<dyn LiveLog>),
    RandomAccess(Arc<dyn RandomAccessLog>),
}

impl LogSource {
    pub fn id(&self) -> LogId {
        match self {
            Self::Live(log) => log.id(),
            Self::RandomAccess(log) => log.id(),
        }
    }
}

impl fmt::Debug for LogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = match self {
            Self::Live(_) => "Live",
            Self::RandomAccess(_) => "RandomAccess",
        };
        write!(f, "LogSource::{shape}({})", self.id())
    }
}

/// Collaborator that groups and announces a dynamic set of logs.
#[async_trait]
pub trait LogAggregator: Send + Sync {
    /// Resolve once the aggregator knows its initial membership.
    async fn ready(&self) -> LogResult<()>;

    /// Logs known right now.
    fn current_logs(&self) -> Vec<LogSource>;

    /// Notifications for logs discovered after subscribing.
    fn subscribe_new_logs(&self) -> broadcast::Receiver<LogSource>;
}
