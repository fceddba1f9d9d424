//! The replicated store: a [`DocumentStore`] plus its owned log, followed
//! logs and aggregate subscriptions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use logsync_log::{LiveLog, Log, LogAggregator, LogSource};
use logsync_store::{DocumentStore, Lookup, WriteResult};
use logsync_types::{DocKey, Document, LogId, Revision};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::aggregate::{spawn_discovery, AggregateHandle};
use crate::applier::Applier;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::follower::{spawn_follower, FollowerStatus, StreamHandle};
use crate::forwarder::Forwarder;

/// A document store kept in sync with a set of logs.
///
/// Local writes go through [`SyncedStore::bulk_write`] and are mirrored into
/// the owned log. Every followed log, owned or not, is replayed into the
/// store by its own follower. Cloning is cheap; clones share all state.
#[derive(Clone)]
pub struct SyncedStore {
    shared: Arc<Shared>,
}

struct Shared {
    store: Arc<dyn DocumentStore>,
    applier: Applier,
    config: SyncConfig,
    registry: Mutex<Registry>,
}

#[derive(Default)]
struct Registry {
    owned: Option<OwnedLog>,
    followed: HashMap<LogId, StreamHandle>,
    aggregates: Vec<AggregateHandle>,
    destroyed: bool,
}

struct OwnedLog {
    log: Arc<dyn LiveLog>,
    forwarder: Forwarder,
    handle: StreamHandle,
}

impl Registry {
    fn is_followed(&self, id: &LogId) -> bool {
        self.owned_id().as_ref() == Some(id) || self.followed.contains_key(id)
    }

    fn owned_id(&self) -> Option<LogId> {
        self.owned.as_ref().map(|owned| owned.log.id())
    }

    fn handle(&self, id: &LogId) -> Option<&StreamHandle> {
        match &self.owned {
            Some(owned) if &owned.log.id() == id => Some(&owned.handle),
            _ => self.followed.get(id),
        }
    }
}

impl Shared {
    fn registry(&self) -> SyncResult<MutexGuard<'_, Registry>> {
        self.registry
            .lock()
            .map_err(|_| SyncError::Internal("registry lock poisoned".into()))
    }

    /// Registry for read-only accessors. A poisoned lock is logged and
    /// reported as `None`.
    fn inspect(&self) -> Option<MutexGuard<'_, Registry>> {
        match self.registry() {
            Ok(registry) => Some(registry),
            Err(e) => {
                warn!(error = %e, "registry unavailable");
                None
            }
        }
    }

    /// Like [`Self::registry`], but refuses once the store is destroyed.
    fn live_registry(&self) -> SyncResult<MutexGuard<'_, Registry>> {
        let registry = self.registry()?;
        if registry.destroyed {
            return Err(SyncError::Destroyed);
        }
        Ok(registry)
    }

    /// Start following `source` unless it already is. Returns whether a new
    /// follower was started.
    fn register(&self, source: LogSource) -> SyncResult<bool> {
        let mut registry = self.live_registry()?;
        let id = source.id();
        if registry.is_followed(&id) {
            debug!(log = %id, "already followed");
            return Ok(false);
        }
        let handle = spawn_follower(source, self.applier.clone(), &self.config);
        registry.followed.insert(id.clone(), handle);
        info!(log = %id, followed = registry.followed.len(), "log followed");
        Ok(true)
    }
}

impl SyncedStore {
    pub fn new(store: Arc<dyn DocumentStore>, config: SyncConfig) -> Self {
        let applier = Applier::new(store.clone());
        Self {
            shared: Arc::new(Shared {
                store,
                applier,
                config,
                registry: Mutex::new(Registry::default()),
            }),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.shared.config
    }

    /// The wrapped store. Writes made directly on it are not forwarded.
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.shared.store
    }

    /// Make `log` the owned log: local writes are appended to it, and it is
    /// followed like any other log.
    ///
    /// Replacing an existing owned log stops the previous owned follower and
    /// waits for it to close. If `log` was already being followed, that
    /// follower is kept.
    pub async fn set_owned_log(&self, log: Arc<dyn LiveLog>) -> SyncResult<()> {
        let id = log.id();
        if !log.is_writable() {
            return Err(SyncError::NotWritable(id));
        }

        let previous = {
            let mut registry = self.shared.live_registry()?;
            if registry.owned_id().as_ref() == Some(&id) {
                return Ok(());
            }
            let handle = match registry.followed.remove(&id) {
                Some(handle) => handle,
                None => spawn_follower(
                    LogSource::Live(log.clone()),
                    self.shared.applier.clone(),
                    &self.shared.config,
                ),
            };
            let forwarder = Forwarder::new(self.shared.store.clone(), log.clone());
            registry.owned.replace(OwnedLog {
                log,
                forwarder,
                handle,
            })
        };
        info!(log = %id, "owned log set");

        if let Some(previous) = previous {
            info!(log = %previous.log.id(), "previous owned log released");
            previous.handle.destroy();
            previous.handle.closed().await?;
        }
        Ok(())
    }

    /// Follow one log. Returns `false` if it is already followed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn follow_log(&self, source: LogSource) -> SyncResult<bool> {
        self.shared.register(source)
    }

    /// Follow every log `aggregator` knows about now or announces later.
    ///
    /// Must be called from within a tokio runtime.
    pub fn follow_aggregate(&self, aggregator: Arc<dyn LogAggregator>) -> SyncResult<()> {
        let mut registry = self.shared.live_registry()?;
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        let handle = spawn_discovery(aggregator, move |source| {
            shared
                .upgrade()
                .ok_or(SyncError::Destroyed)?
                .register(source)
        });
        registry.aggregates.push(handle);
        info!(aggregates = registry.aggregates.len(), "aggregate followed");
        Ok(())
    }

    /// Stop following a log and wait for its follower to close.
    ///
    /// Returns `false` if the log was not followed. The owned log cannot be
    /// unfollowed. An aggregate that announces the log again will re-follow
    /// it.
    pub async fn unfollow(&self, id: &LogId) -> SyncResult<bool> {
        let handle = {
            let mut registry = self.shared.live_registry()?;
            if registry.owned_id().as_ref() == Some(id) {
                return Err(SyncError::OwnedLogPinned(id.clone()));
            }
            registry.followed.remove(id)
        };
        let Some(handle) = handle else {
            return Ok(false);
        };
        handle.destroy();
        handle.closed().await?;
        info!(log = %id, "log unfollowed");
        Ok(true)
    }

    /// Write documents and forward each written one to the owned log.
    pub async fn bulk_write(&self, docs: Vec<Document>) -> SyncResult<Vec<WriteResult>> {
        let forwarder = {
            let registry = self.shared.live_registry()?;
            registry
                .owned
                .as_ref()
                .map(|owned| owned.forwarder.clone())
                .ok_or(SyncError::NoOwnedLog)?
        };
        forwarder.bulk_write(docs).await
    }

    pub async fn get(&self, key: &DocKey, rev: Option<&Revision>) -> SyncResult<Lookup> {
        Ok(self.shared.store.get(key, rev).await?)
    }

    pub async fn all_docs(&self) -> SyncResult<Vec<Document>> {
        Ok(self.shared.store.all_docs().await?)
    }

    /// Every followed log, owned log included, in id order.
    pub fn followed_logs(&self) -> Vec<LogId> {
        let Some(registry) = self.shared.inspect() else {
            return Vec::new();
        };
        let mut ids: Vec<LogId> = registry
            .owned_id()
            .into_iter()
            .chain(registry.followed.keys().cloned())
            .collect();
        ids.sort();
        ids
    }

    pub fn owned_log_id(&self) -> Option<LogId> {
        self.shared.inspect()?.owned_id()
    }

    pub fn follower_status(&self, id: &LogId) -> Option<FollowerStatus> {
        self.shared.inspect()?.handle(id).map(StreamHandle::status)
    }

    /// Watch a follower's status. The receiver outlives the follower.
    pub fn subscribe_follower(&self, id: &LogId) -> Option<watch::Receiver<FollowerStatus>> {
        self.shared.inspect()?.handle(id).map(StreamHandle::subscribe)
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.inspect().map_or(true, |r| r.destroyed)
    }

    /// Tear everything down.
    ///
    /// Destroys the underlying store while every follower and aggregate task
    /// is cancelled and awaited. All of them are waited for even if one
    /// fails; the first failure is returned. Destroying twice is a no-op.
    pub async fn destroy(&self) -> SyncResult<()> {
        let (owned, followed, aggregates) = {
            let mut registry = self.shared.registry()?;
            if registry.destroyed {
                return Ok(());
            }
            registry.destroyed = true;
            (
                registry.owned.take(),
                std::mem::take(&mut registry.followed),
                std::mem::take(&mut registry.aggregates),
            )
        };

        let handles: Vec<StreamHandle> = owned
            .map(|owned| owned.handle)
            .into_iter()
            .chain(followed.into_values())
            .collect();
        info!(
            followers = handles.len(),
            aggregates = aggregates.len(),
            "tearing down"
        );
        for aggregate in &aggregates {
            aggregate.destroy();
        }
        for handle in &handles {
            handle.destroy();
        }

        let mut tasks = JoinSet::new();
        let store = self.shared.store.clone();
        tasks.spawn(async move { store.destroy().await.map_err(SyncError::from) });
        for aggregate in aggregates {
            tasks.spawn(aggregate.closed());
        }
        for handle in handles {
            tasks.spawn(async move { handle.closed().await });
        }

        let mut first_fault = None;
        while let Some(joined) = tasks.join_next().await {
            let result = joined
                .map_err(|e| SyncError::Teardown(format!("teardown task: {e}")))
                .and_then(|result| result);
            if let Err(e) = result {
                warn!(error = %e, "teardown step failed");
                first_fault.get_or_insert(e);
            }
        }

        match first_fault {
            Some(fault) => Err(fault),
            None => {
                info!("teardown complete");
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for SyncedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncedStore")
            .field("owned", &self.owned_log_id())
            .field("followed", &self.followed_logs())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use bytes::Bytes;
    use logsync_log::{LogConfig, MemoryAggregator, MemoryLog, RandomAccessLog};
    use serde_json::json;

    use logsync_store::WriteStatus;

    use crate::applier::tests::ProbeStore;
    use crate::follower::FollowerState;

    fn payload(value: serde_json::Value) -> Bytes {
        Bytes::from(serde_json::to_vec(&value).unwrap())
    }

    fn doc(key: &str, value: serde_json::Value) -> Document {
        Document::from_value(key, value).unwrap()
    }

    fn setup() -> (Arc<ProbeStore>, SyncedStore) {
        let store = Arc::new(ProbeStore::default());
        let synced = SyncedStore::new(store.clone(), SyncConfig::default());
        (store, synced)
    }

    fn memory_log(hex: &str) -> Arc<MemoryLog> {
        Arc::new(MemoryLog::new(LogId::from_hex(hex).unwrap(), LogConfig::default()))
    }

    async fn wait_for_status(
        synced: &SyncedStore,
        id: &LogId,
        pred: impl Fn(&FollowerStatus) -> bool,
    ) -> FollowerStatus {
        let mut rx = synced.subscribe_follower(id).expect("log is not followed");
        let status = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| pred(s)))
            .await
            .expect("follower did not reach expected status")
            .expect("status channel closed")
            .clone();
        status
    }

    async fn wait_for_doc(synced: &SyncedStore, key: &str) -> Document {
        let key = DocKey::from(key);
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Lookup::Found(doc) = synced.get(&key, None).await.unwrap() {
                    return doc;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("document never arrived")
    }

    #[tokio::test]
    async fn hello_goodbye_reaches_the_store() {
        let (_store, synced) = setup();
        let log = memory_log("ab12");
        assert_eq!(log.append(payload(json!({"hello": "goodbye"}))).await.unwrap(), 0);

        assert!(synced.follow_log(log.live_source()).unwrap());
        let doc = wait_for_doc(&synced, "ab12@0").await;
        assert_eq!(doc.field("hello"), Some(&json!("goodbye")));
        assert_eq!(doc.field("_key"), Some(&json!("ab12")));
        assert_eq!(doc.field("_seq"), Some(&json!(0)));
    }

    #[tokio::test]
    async fn write_without_owned_log_is_refused() {
        let (store, synced) = setup();
        let err = synced.bulk_write(vec![doc("a", json!({}))]).await.unwrap_err();
        assert!(matches!(err, SyncError::NoOwnedLog));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn read_only_log_cannot_be_owned() {
        let (_store, synced) = setup();
        let log = Arc::new(MemoryLog::read_only(LogId::derive("remote"), LogConfig::default()));
        let err = synced.set_owned_log(log).await.unwrap_err();
        assert!(matches!(err, SyncError::NotWritable(_)));
        assert!(synced.owned_log_id().is_none());
    }

    #[tokio::test]
    async fn local_write_is_forwarded_once_and_loop_back_is_skipped() {
        let (store, synced) = setup();
        let owned = memory_log("0a0b");
        synced.set_owned_log(owned.clone()).await.unwrap();

        let results = synced
            .bulk_write(vec![doc("note", json!({"text": "hi"}))])
            .await
            .unwrap();
        let rev = results[0].revision().cloned().unwrap();

        assert_eq!(RandomAccessLog::len(&*owned), 1);
        let entry = owned.read_at(0, false).await.unwrap();
        let forwarded = Document::from_json(&entry.payload).unwrap();
        assert_eq!(forwarded.key.as_str(), "note");
        assert_eq!(forwarded.rev, Some(rev));
        assert_eq!(forwarded.field("text"), Some(&json!("hi")));

        let id = owned.id();
        wait_for_status(&synced, &id, |s| s.skipped == 1).await;
        assert_eq!(store.write_count(), 1);
        assert_eq!(store.inner.revision_count(&"note".into()), 1);
    }

    #[tokio::test]
    async fn failed_store_write_forwards_nothing() {
        let (store, synced) = setup();
        let owned = memory_log("0c0d");
        synced.set_owned_log(owned.clone()).await.unwrap();

        store.fail_writes.store(true, Ordering::SeqCst);
        assert!(matches!(
            synced.bulk_write(vec![doc("x", json!({}))]).await,
            Err(SyncError::Store(_))
        ));
        assert_eq!(RandomAccessLog::len(&*owned), 0);
    }

    #[tokio::test]
    async fn redelivered_entries_do_not_rewrite() {
        let (store, synced) = setup();
        let log = memory_log("1234");
        for n in 0..4 {
            log.append(payload(json!({"n": n}))).await.unwrap();
        }
        synced.follow_log(log.live_source()).unwrap();
        wait_for_status(&synced, &log.id(), |s| s.applied == 4).await;
        assert_eq!(store.write_count(), 4);

        // Re-scan the same log from zero through a fresh follower.
        assert!(synced.unfollow(&log.id()).await.unwrap());
        synced.follow_log(log.random_access_source()).unwrap();
        wait_for_status(&synced, &log.id(), |s| s.skipped == 4).await;
        assert_eq!(store.write_count(), 4);
    }

    #[tokio::test]
    async fn entries_land_in_sequence_without_gaps() {
        let (_store, synced) = setup();
        let log = memory_log("5678");
        synced.follow_log(log.live_source()).unwrap();
        for n in 0..20u64 {
            log.append(payload(json!({"n": n}))).await.unwrap();
        }
        wait_for_status(&synced, &log.id(), |s| s.applied == 20).await;

        for n in 0..20u64 {
            let doc = wait_for_doc(&synced, &format!("5678@{n}")).await;
            assert_eq!(doc.field("n"), Some(&json!(n)));
        }
    }

    #[tokio::test]
    async fn three_logs_fan_in() {
        let (_store, synced) = setup();
        let logs = [memory_log("a1"), memory_log("b2"), memory_log("c3")];
        for log in &logs {
            synced.follow_log(log.live_source()).unwrap();
            log.append(payload(json!({"from": log.id().to_hex()}))).await.unwrap();
        }

        for hex in ["a1", "b2", "c3"] {
            let doc = wait_for_doc(&synced, &format!("{hex}@0")).await;
            assert_eq!(doc.field("from"), Some(&json!(hex)));
            assert_eq!(doc.field("_key"), Some(&json!(hex)));
        }
        assert_eq!(synced.all_docs().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn same_log_is_followed_once() {
        let (_store, synced) = setup();
        let log = memory_log("beef");
        assert!(synced.follow_log(log.live_source()).unwrap());
        assert!(!synced.follow_log(log.random_access_source()).unwrap());

        synced.set_owned_log(log.clone()).await.unwrap();
        assert!(!synced.follow_log(log.live_source()).unwrap());
        assert_eq!(synced.followed_logs(), vec![log.id()]);
        assert_eq!(synced.owned_log_id(), Some(log.id()));
    }

    #[tokio::test]
    async fn aggregate_follows_current_and_later_logs() {
        let (_store, synced) = setup();
        let aggregator = Arc::new(MemoryAggregator::new(LogConfig::default()));
        let alice = aggregator.writer("alice").unwrap();
        alice.append(payload(json!({"who": "alice"}))).await.unwrap();

        synced.follow_aggregate(aggregator.clone()).unwrap();
        wait_for_doc(&synced, &format!("{}@0", alice.id().to_hex())).await;

        let bob = aggregator.writer("bob").unwrap();
        bob.append(payload(json!({"who": "bob"}))).await.unwrap();
        let doc = wait_for_doc(&synced, &format!("{}@0", bob.id().to_hex())).await;
        assert_eq!(doc.field("who"), Some(&json!("bob")));

        let mut expected = vec![alice.id(), bob.id()];
        expected.sort();
        assert_eq!(synced.followed_logs(), expected);
    }

    #[tokio::test]
    async fn unfollow_stops_the_follower() {
        let (store, synced) = setup();
        let log = memory_log("dead");
        synced.follow_log(log.live_source()).unwrap();
        let mut status = synced.subscribe_follower(&log.id()).unwrap();

        assert!(synced.unfollow(&log.id()).await.unwrap());
        assert!(status.borrow_and_update().state.is_terminal());
        assert!(!synced.unfollow(&log.id()).await.unwrap());

        log.append(payload(json!({"late": true}))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.write_count(), 0);
        assert!(synced.followed_logs().is_empty());
    }

    #[tokio::test]
    async fn owned_log_cannot_be_unfollowed() {
        let (_store, synced) = setup();
        let owned = memory_log("f00d");
        synced.set_owned_log(owned.clone()).await.unwrap();
        assert!(matches!(
            synced.unfollow(&owned.id()).await,
            Err(SyncError::OwnedLogPinned(_))
        ));
    }

    #[tokio::test]
    async fn replacing_the_owned_log_closes_the_previous_follower() {
        let (_store, synced) = setup();
        let first = memory_log("0001");
        let second = memory_log("0002");
        synced.set_owned_log(first.clone()).await.unwrap();
        let mut first_status = synced.subscribe_follower(&first.id()).unwrap();

        synced.set_owned_log(second.clone()).await.unwrap();
        assert!(first_status.borrow_and_update().state.is_terminal());
        assert_eq!(synced.owned_log_id(), Some(second.id()));
        assert_eq!(synced.followed_logs(), vec![second.id()]);

        synced.bulk_write(vec![doc("k", json!({}))]).await.unwrap();
        assert_eq!(RandomAccessLog::len(&*first), 0);
        assert_eq!(RandomAccessLog::len(&*second), 1);
    }

    #[tokio::test]
    async fn teardown_closes_every_follower_and_destroys_the_store() {
        let (store, synced) = setup();
        let owned = memory_log("aaaa");
        let idle = memory_log("bbbb");
        let busy = Arc::new(MemoryLog::read_only(LogId::from_hex("cccc").unwrap(), LogConfig::default()));
        busy.ingest(payload(json!({"n": 0}))).unwrap();

        synced.set_owned_log(owned.clone()).await.unwrap();
        synced.follow_log(idle.live_source()).unwrap();
        synced.follow_log(busy.random_access_source()).unwrap();
        synced
            .follow_aggregate(Arc::new(MemoryAggregator::pending(LogConfig::default())))
            .unwrap();
        wait_for_status(&synced, &busy.id(), |s| s.applied == 1).await;

        let watchers: Vec<_> = [owned.id(), idle.id(), busy.id()]
            .iter()
            .map(|id| synced.subscribe_follower(id).unwrap())
            .collect();

        tokio::time::timeout(Duration::from_secs(5), synced.destroy())
            .await
            .expect("teardown hung")
            .unwrap();

        for watcher in &watchers {
            assert_eq!(watcher.borrow().state, FollowerState::Closed);
        }
        assert!(store.inner.is_destroyed());
        assert!(synced.is_destroyed());
        assert!(synced.followed_logs().is_empty());
    }

    #[tokio::test]
    async fn destroyed_store_refuses_registration_and_writes() {
        let (_store, synced) = setup();
        synced.destroy().await.unwrap();
        synced.destroy().await.unwrap();

        let log = memory_log("abcd");
        assert!(matches!(synced.follow_log(log.live_source()), Err(SyncError::Destroyed)));
        assert!(matches!(synced.set_owned_log(log).await, Err(SyncError::Destroyed)));
        assert!(matches!(
            synced.bulk_write(vec![doc("x", json!({}))]).await,
            Err(SyncError::Destroyed)
        ));
    }

    #[tokio::test]
    async fn teardown_completes_while_an_apply_is_in_flight() {
        let (store, synced) = setup();
        store.hold_writes.store(true, Ordering::SeqCst);
        let log = memory_log("9999");
        log.append(payload(json!({"n": 0}))).await.unwrap();
        synced.follow_log(log.live_source()).unwrap();
        let watcher = synced.subscribe_follower(&log.id()).unwrap();

        // The follower is now parked inside the store write.
        tokio::time::timeout(Duration::from_secs(5), store.write_started.notified())
            .await
            .expect("apply never reached the store");

        let teardown = tokio::spawn({
            let synced = synced.clone();
            async move { synced.destroy().await }
        });
        tokio::time::timeout(Duration::from_secs(5), async {
            while !store.inner.is_destroyed() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("store was not destroyed");
        assert!(!teardown.is_finished());

        store.write_release.notify_one();
        tokio::time::timeout(Duration::from_secs(5), teardown)
            .await
            .expect("teardown hung")
            .unwrap()
            .unwrap();

        assert_eq!(watcher.borrow().state, FollowerState::Closed);
        assert_eq!(watcher.borrow().applied, 0);
        assert!(store.inner.is_empty());
    }

    #[tokio::test]
    async fn editing_a_replicated_document_at_the_last_generation_conflicts() {
        let (store, synced) = setup();
        let top = format!("{}-ab", u64::MAX);
        let remote = memory_log("7777");
        remote
            .append(payload(json!({"_id": "k", "_rev": &top, "v": 1})))
            .await
            .unwrap();
        synced.follow_log(remote.live_source()).unwrap();
        let replicated = wait_for_doc(&synced, "k").await;
        assert_eq!(replicated.rev.as_ref().map(ToString::to_string), Some(top.clone()));

        let owned = memory_log("8888");
        synced.set_owned_log(owned.clone()).await.unwrap();
        let edit = doc("k", json!({"v": 2})).with_rev(top.parse().unwrap());
        let results = synced.bulk_write(vec![edit]).await.unwrap();

        assert!(matches!(results[0].status, WriteStatus::Conflict { .. }));
        assert_eq!(RandomAccessLog::len(&*owned), 0);
        assert_eq!(store.inner.revision_count(&"k".into()), 1);
        assert!(!store.get(&"7777@0".into(), None).await.unwrap().is_found());
    }

    #[test]
    #[should_panic(expected = "Tokio")]
    fn follow_log_needs_a_runtime() {
        let synced = SyncedStore::new(Arc::new(ProbeStore::default()), SyncConfig::default());
        let _ = synced.follow_log(memory_log("0101").live_source());
    }

    #[test]
    fn poisoned_registry_reads_as_empty_and_refuses_registration() {
        let synced = SyncedStore::new(Arc::new(ProbeStore::default()), SyncConfig::default());
        let shared = synced.shared.clone();
        let _ = std::thread::spawn(move || {
            let _guard = shared.registry.lock().unwrap();
            panic!("poison the registry");
        })
        .join();

        assert!(synced.followed_logs().is_empty());
        assert!(synced.owned_log_id().is_none());
        assert!(synced.follower_status(&LogId::derive("any")).is_none());
        assert!(synced.is_destroyed());
        assert!(matches!(
            synced.follow_log(memory_log("0202").live_source()),
            Err(SyncError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn teardown_reports_store_fault_but_still_closes_followers() {
        let (store, synced) = setup();
        let log = memory_log("eeee");
        synced.follow_log(log.live_source()).unwrap();
        let watcher = synced.subscribe_follower(&log.id()).unwrap();

        store.fail_destroy.store(true, Ordering::SeqCst);
        let err = synced.destroy().await.unwrap_err();
        assert!(matches!(err, SyncError::Store(_)));
        assert!(watcher.borrow().state.is_terminal());
    }
}
