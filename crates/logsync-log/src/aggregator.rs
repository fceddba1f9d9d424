use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use logsync_types::LogId;
use tokio::sync::{broadcast, watch};
use tracing::info;

use crate::error::{LogError, LogResult};
use crate::memory::{LogConfig, MemoryLog};
use crate::traits::{Log, LogAggregator, LogSource};

/// Capacity of the discovery broadcast channel.
const ANNOUNCE_CAPACITY: usize = 64;

/// In-memory log-of-logs.
///
/// Holds named local writer logs plus any remote logs added later, and
/// announces every new member to subscribers. Members are exposed in their
/// random-access shape.
pub struct MemoryAggregator {
    config: LogConfig,
    members: RwLock<BTreeMap<LogId, Arc<MemoryLog>>>,
    writers: RwLock<BTreeMap<String, LogId>>,
    announcements: broadcast::Sender<LogSource>,
    ready: watch::Sender<bool>,
}

impl MemoryAggregator {
    /// Create an aggregator that is ready immediately.
    pub fn new(config: LogConfig) -> Self {
        let aggregator = Self::pending(config);
        aggregator.mark_ready();
        aggregator
    }

    /// Create an aggregator whose `ready` resolves only after [`Self::mark_ready`].
    pub fn pending(config: LogConfig) -> Self {
        let (announcements, _) = broadcast::channel(ANNOUNCE_CAPACITY);
        let (ready, _) = watch::channel(false);
        Self {
            config,
            members: RwLock::new(BTreeMap::new()),
            writers: RwLock::new(BTreeMap::new()),
            announcements,
            ready,
        }
    }

    pub fn mark_ready(&self) {
        self.ready.send_replace(true);
    }

    /// Get or create the local writable log registered under `name`.
    pub fn writer(&self, name: &str) -> LogResult<Arc<MemoryLog>> {
        let existing = self
            .writers
            .read()
            .map_err(|_| LogError::Transport("aggregator lock poisoned".into()))?
            .get(name)
            .cloned();
        if let Some(id) = existing {
            if let Some(log) = self.member(&id)? {
                return Ok(log);
            }
        }

        let log = Arc::new(MemoryLog::new(LogId::random(), self.config.clone()));
        self.writers
            .write()
            .map_err(|_| LogError::Transport("aggregator lock poisoned".into()))?
            .insert(name.to_string(), log.id());
        self.add_log(log.clone())?;
        info!(name, log = %log.id(), "writer created");
        Ok(log)
    }

    /// Register a log (for example one discovered from a peer) and announce it.
    ///
    /// Returns `false` if a log with the same identity is already a member.
    pub fn add_log(&self, log: Arc<MemoryLog>) -> LogResult<bool> {
        let id = log.id();
        {
            let mut members = self
                .members
                .write()
                .map_err(|_| LogError::Transport("aggregator lock poisoned".into()))?;
            if members.contains_key(&id) {
                return Ok(false);
            }
            members.insert(id, log.clone());
        }
        // No subscribers is fine; late subscribers use `current_logs`.
        let _ = self.announcements.send(log.random_access_source());
        Ok(true)
    }

    fn member(&self, id: &LogId) -> LogResult<Option<Arc<MemoryLog>>> {
        Ok(self
            .members
            .read()
            .map_err(|_| LogError::Transport("aggregator lock poisoned".into()))?
            .get(id)
            .cloned())
    }

    /// Number of member logs.
    pub fn len(&self) -> usize {
        self.members.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl LogAggregator for MemoryAggregator {
    async fn ready(&self) -> LogResult<()> {
        let mut ready = self.ready.subscribe();
        ready
            .wait_for(|ready| *ready)
            .await
            .map(|_| ())
            .map_err(|_| LogError::NotReady)
    }

    fn current_logs(&self) -> Vec<LogSource> {
        self.members
            .read()
            .map(|members| members.values().map(|log| log.random_access_source()).collect())
            .unwrap_or_default()
    }

    fn subscribe_new_logs(&self) -> broadcast::Receiver<LogSource> {
        self.announcements.subscribe()
    }
}

impl std::fmt::Debug for MemoryAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryAggregator")
            .field("members", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn writer_is_created_once_per_name() {
        let agg = MemoryAggregator::new(LogConfig::default());
        let a = agg.writer("local").unwrap();
        let again = agg.writer("local").unwrap();
        let b = agg.writer("other").unwrap();
        assert_eq!(a.id(), again.id());
        assert_ne!(a.id(), b.id());
        assert_eq!(agg.len(), 2);
    }

    #[tokio::test]
    async fn new_logs_are_announced() {
        let agg = MemoryAggregator::new(LogConfig::default());
        let mut news = agg.subscribe_new_logs();
        let log = agg.writer("local").unwrap();
        let announced = news.recv().await.unwrap();
        assert_eq!(announced.id(), log.id());
        assert!(matches!(announced, LogSource::RandomAccess(_)));
    }

    #[tokio::test]
    async fn duplicate_add_is_ignored() {
        let agg = MemoryAggregator::new(LogConfig::default());
        let log = Arc::new(MemoryLog::read_only(LogId::derive("peer"), LogConfig::default()));
        assert!(agg.add_log(log.clone()).unwrap());
        assert!(!agg.add_log(log).unwrap());
        assert_eq!(agg.current_logs().len(), 1);
    }

    #[tokio::test]
    async fn pending_aggregator_waits_for_ready() {
        let agg = Arc::new(MemoryAggregator::pending(LogConfig::default()));
        let waiter = {
            let agg = agg.clone();
            tokio::spawn(async move { agg.ready().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());
        agg.mark_ready();
        waiter.await.unwrap().unwrap();
    }
}
