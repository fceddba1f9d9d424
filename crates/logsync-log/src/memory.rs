use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use logsync_types::LogId;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::entry::{LiveRead, RawEntry};
use crate::error::{LogError, LogResult};
use crate::traits::{LiveLog, Log, LogSource, RandomAccessLog};

/// Configuration for in-memory logs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Buffered entries per live read before the producer waits.
    pub live_buffer: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { live_buffer: 64 }
    }
}

/// In-memory append-only log implementing both read shapes.
///
/// Writable logs accept [`LiveLog::append`]; every log accepts
/// [`MemoryLog::ingest`], which models entries arriving from a remote replica.
pub struct MemoryLog {
    inner: Arc<LogInner>,
}

struct LogInner {
    id: LogId,
    writable: bool,
    config: LogConfig,
    entries: RwLock<Vec<Bytes>>,
    length: watch::Sender<u64>,
    closed: CancellationToken,
}

impl LogInner {
    fn len(&self) -> u64 {
        *self.length.borrow()
    }

    fn push(&self, payload: Bytes) -> LogResult<u64> {
        if self.closed.is_cancelled() {
            return Err(LogError::Closed);
        }
        let mut entries = self
            .entries
            .write()
            .map_err(|_| LogError::Transport("log write lock poisoned".into()))?;
        let seq = entries.len() as u64;
        entries.push(payload);
        // Publish while still holding the lock so lengths arrive in order.
        self.length.send_replace(seq + 1);
        trace!(log = %self.id, seq, "entry appended");
        Ok(seq)
    }

    fn entries_from(&self, from: u64) -> LogResult<Vec<RawEntry>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| LogError::Transport("log read lock poisoned".into()))?;
        Ok(entries
            .iter()
            .enumerate()
            .skip(from as usize)
            .map(|(seq, payload)| RawEntry::new(seq as u64, payload.clone()))
            .collect())
    }

    fn entry(&self, seq: u64) -> LogResult<Option<RawEntry>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| LogError::Transport("log read lock poisoned".into()))?;
        Ok(entries
            .get(seq as usize)
            .map(|payload| RawEntry::new(seq, payload.clone())))
    }
}

impl MemoryLog {
    /// Create an empty writable log.
    pub fn new(id: LogId, config: LogConfig) -> Self {
        Self::build(id, true, config)
    }

    /// Create an empty log that only receives replicated entries.
    pub fn read_only(id: LogId, config: LogConfig) -> Self {
        Self::build(id, false, config)
    }

    fn build(id: LogId, writable: bool, config: LogConfig) -> Self {
        let (length, _) = watch::channel(0);
        Self {
            inner: Arc::new(LogInner {
                id,
                writable,
                config,
                entries: RwLock::new(Vec::new()),
                length,
                closed: CancellationToken::new(),
            }),
        }
    }

    /// Append an entry received from a remote replica.
    pub fn ingest(&self, payload: impl Into<Bytes>) -> LogResult<u64> {
        self.inner.push(payload.into())
    }

    /// Close the log: appends fail and live reads end.
    pub fn close(&self) {
        self.inner.closed.cancel();
        debug!(log = %self.inner.id, "log closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    /// This log as a live-stream source.
    pub fn live_source(self: &Arc<Self>) -> LogSource {
        LogSource::Live(self.clone())
    }

    /// This log as a random-access source.
    pub fn random_access_source(self: &Arc<Self>) -> LogSource {
        LogSource::RandomAccess(self.clone())
    }
}

impl Log for MemoryLog {
    fn id(&self) -> LogId {
        self.inner.id.clone()
    }
}

#[async_trait]
impl LiveLog for MemoryLog {
    fn is_writable(&self) -> bool {
        self.inner.writable
    }

    async fn open_live_read(&self) -> LogResult<LiveRead> {
        if self.inner.closed.is_cancelled() {
            return Err(LogError::Closed);
        }
        let (tx, read) = LiveRead::channel(self.inner.config.live_buffer);
        let inner = self.inner.clone();
        tokio::spawn(async move {
            pump_live(inner, tx).await;
        });
        Ok(read)
    }

    async fn append(&self, payload: Bytes) -> LogResult<u64> {
        if !self.inner.writable {
            return Err(LogError::NotWritable(self.inner.id.clone()));
        }
        self.inner.push(payload)
    }
}

/// Feed a live read: replay from 0, then follow the length watch until the
/// reader goes away or the log closes.
async fn pump_live(inner: Arc<LogInner>, tx: mpsc::Sender<LogResult<RawEntry>>) {
    let mut length = inner.length.subscribe();
    let mut next = 0u64;
    loop {
        length.borrow_and_update();
        let batch = match inner.entries_from(next) {
            Ok(batch) => batch,
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                return;
            }
        };
        for entry in batch {
            tokio::select! {
                biased;
                _ = inner.closed.cancelled() => return,
                sent = tx.send(Ok(entry)) => {
                    if sent.is_err() {
                        return;
                    }
                }
            }
            next += 1;
        }
        tokio::select! {
            _ = inner.closed.cancelled() => return,
            _ = tx.closed() => return,
            changed = length.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
}

#[async_trait]
impl RandomAccessLog for MemoryLog {
    async fn ready(&self) -> LogResult<()> {
        if self.inner.closed.is_cancelled() {
            return Err(LogError::Closed);
        }
        Ok(())
    }

    fn len(&self) -> u64 {
        self.inner.len()
    }

    async fn read_at(&self, seq: u64, blocking: bool) -> LogResult<RawEntry> {
        let mut length = self.inner.length.subscribe();
        loop {
            length.borrow_and_update();
            if let Some(entry) = self.inner.entry(seq)? {
                return Ok(entry);
            }
            if !blocking {
                return Err(LogError::OutOfRange {
                    seq,
                    len: self.inner.len(),
                });
            }
            tokio::select! {
                _ = self.inner.closed.cancelled() => return Err(LogError::Closed),
                changed = length.changed() => {
                    if changed.is_err() {
                        return Err(LogError::Closed);
                    }
                }
            }
        }
    }

    fn appended(&self) -> watch::Receiver<u64> {
        self.inner.length.subscribe()
    }
}

impl std::fmt::Debug for MemoryLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLog")
            .field("id", &self.inner.id)
            .field("writable", &self.inner.writable)
            .field("len", &self.inner.len())
            .finish()
    }
}
