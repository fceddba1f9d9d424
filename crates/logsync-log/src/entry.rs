use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::LogResult;

/// A raw, still-encoded log entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawEntry {
    pub seq: u64,
    pub payload: Bytes,
}

impl RawEntry {
    pub fn new(seq: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            seq,
            payload: payload.into(),
        }
    }
}

/// Receiving half of a live, non-snapshot read subscription.
///
/// Yields historical entries from sequence 0 and then every future append.
/// Transport faults arrive in-band as `Err` items; `None` means the producer
/// has shut down. Dropping the `LiveRead` closes the subscription.
#[derive(Debug)]
pub struct LiveRead {
    rx: mpsc::Receiver<LogResult<RawEntry>>,
}

impl LiveRead {
    pub fn new(rx: mpsc::Receiver<LogResult<RawEntry>>) -> Self {
        Self { rx }
    }

    /// Create a connected sender/`LiveRead` pair with the given buffer.
    pub fn channel(capacity: usize) -> (mpsc::Sender<LogResult<RawEntry>>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self::new(rx))
    }

    /// Wait for the next item.
    pub async fn next(&mut self) -> Option<LogResult<RawEntry>> {
        self.rx.recv().await
    }

    /// Stop accepting items while still draining what is buffered.
    pub fn close(&mut self) {
        self.rx.close();
    }
}
