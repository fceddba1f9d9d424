//! Per-log follower tasks.
//!
//! Each follower is one spawned task running two halves joined together: a
//! reader that pulls raw entries from the log and decodes them, and an
//! applier that drains a bounded queue into the store. Cancelling the handle
//! stops the reader immediately; the applier finishes the write it is in the
//! middle of and abandons whatever is still queued.

use std::sync::Arc;

use logsync_log::{LiveLog, LogSource, RandomAccessLog};
use logsync_types::LogId;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::applier::{ApplyOutcome, Applier};
use crate::codec::{decode_entry, Candidate};
use crate::config::{EntryErrorPolicy, SyncConfig};
use crate::error::{SyncError, SyncResult};

/// Lifecycle state of a follower.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FollowerState {
    /// Opening the log subscription.
    Starting,
    /// Receiving and applying entries.
    Running,
    /// Stopped cleanly, by cancellation or because the log ended.
    Closed,
    /// Stopped because of a fatal fault.
    Failed(String),
}

impl FollowerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed(_))
    }
}

/// Observable counters for one follower.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FollowerStatus {
    pub state: FollowerState,
    /// Entries that produced a store write.
    pub applied: u64,
    /// Entries already present (or refused by the store as conflicting).
    pub skipped: u64,
    /// Per-entry read/decode faults.
    pub faults: u64,
    pub last_fault: Option<String>,
}

impl Default for FollowerStatus {
    fn default() -> Self {
        Self {
            state: FollowerState::Starting,
            applied: 0,
            skipped: 0,
            faults: 0,
            last_fault: None,
        }
    }
}

/// Handle to a running follower.
///
/// Dropping the handle cancels the follower; [`StreamHandle::closed`]
/// resolves once it has fully stopped.
#[derive(Debug)]
pub struct StreamHandle {
    log: LogId,
    cancel: CancellationToken,
    status: watch::Receiver<FollowerStatus>,
}

impl StreamHandle {
    pub fn log_id(&self) -> &LogId {
        &self.log
    }

    /// Snapshot of the follower's status.
    pub fn status(&self) -> FollowerStatus {
        self.status.borrow().clone()
    }

    /// Watch the follower's status.
    pub fn subscribe(&self) -> watch::Receiver<FollowerStatus> {
        self.status.clone()
    }

    /// Ask the follower to stop. Returns immediately.
    pub fn destroy(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.status.borrow().state.is_terminal()
    }

    /// Wait until the follower has stopped.
    ///
    /// Fails only if the follower task died without reporting a final state.
    pub async fn closed(&self) -> SyncResult<()> {
        let mut status = self.status.clone();
        status
            .wait_for(|s| s.state.is_terminal())
            .await
            .map(|_| ())
            .map_err(|_| {
                SyncError::Teardown(format!("follower for {} exited without closing", self.log))
            })
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Start following `source`, applying entries through `applier`.
///
/// Must be called from within a tokio runtime.
pub fn spawn_follower(source: LogSource, applier: Applier, config: &SyncConfig) -> StreamHandle {
    let log = source.id();
    let cancel = CancellationToken::new();
    let (status_tx, status_rx) = watch::channel(FollowerStatus::default());
    let (queue_tx, queue_rx) = mpsc::channel(config.apply_queue_capacity.max(1));

    let ctx = FollowerCtx {
        log: log.clone(),
        cancel: cancel.clone(),
        status: status_tx,
        policy: config.on_entry_error,
    };
    let catch_up = config.catch_up_random_access;

    info!(log = %log, ?source, "follower starting");
    tokio::spawn(async move {
        let reader = async {
            match source {
                LogSource::Live(log) => read_live(&ctx, log, queue_tx).await,
                LogSource::RandomAccess(log) => read_random_access(&ctx, log, catch_up, queue_tx).await,
            }
        };
        let (read_result, apply_result) = tokio::join!(reader, apply_queue(&ctx, queue_rx, applier));

        let final_state = match apply_result.and(read_result) {
            Ok(()) => FollowerState::Closed,
            Err(e) => {
                error!(log = %ctx.log, error = %e, "follower failed");
                FollowerState::Failed(e.to_string())
            }
        };
        info!(log = %ctx.log, state = ?final_state, "follower stopped");
        ctx.status.send_modify(|s| s.state = final_state);
    });

    StreamHandle {
        log,
        cancel,
        status: status_rx,
    }
}

struct FollowerCtx {
    log: LogId,
    cancel: CancellationToken,
    status: watch::Sender<FollowerStatus>,
    policy: EntryErrorPolicy,
}

impl FollowerCtx {
    fn running(&self) {
        self.status.send_modify(|s| {
            if s.state == FollowerState::Starting {
                s.state = FollowerState::Running;
            }
        });
    }

    /// Record a per-entry fault; stop the follower if the policy says so.
    fn entry_fault(&self, fault: SyncError) -> SyncResult<()> {
        warn!(log = %self.log, error = %fault, "entry fault");
        let message = fault.to_string();
        self.status.send_modify(|s| {
            s.faults += 1;
            s.last_fault = Some(message);
        });
        match self.policy {
            EntryErrorPolicy::Continue => Ok(()),
            EntryErrorPolicy::Stop => Err(fault),
        }
    }

    fn stream_fault(&self, reason: impl ToString) -> SyncError {
        SyncError::Stream {
            log: self.log.clone(),
            reason: reason.to_string(),
        }
    }

    /// Queue a candidate. Returns `false` once the applier side is gone.
    async fn enqueue(&self, queue: &mpsc::Sender<Candidate>, candidate: Candidate) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = queue.send(candidate) => sent.is_ok(),
        }
    }
}

async fn read_live(
    ctx: &FollowerCtx,
    log: Arc<dyn LiveLog>,
    queue: mpsc::Sender<Candidate>,
) -> SyncResult<()> {
    let opened = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => return Ok(()),
        opened = log.open_live_read() => opened,
    };
    let mut read = opened.map_err(|e| ctx.stream_fault(e))?;
    ctx.running();

    loop {
        let item = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Ok(()),
            item = read.next() => item,
        };
        let entry = match item {
            None => {
                debug!(log = %ctx.log, "live stream ended");
                return Ok(());
            }
            Some(Ok(entry)) => entry,
            Some(Err(e)) => {
                ctx.entry_fault(ctx.stream_fault(e))?;
                continue;
            }
        };
        match decode_entry(&ctx.log, &entry) {
            Ok(candidate) => {
                if !ctx.enqueue(&queue, candidate).await {
                    return Ok(());
                }
            }
            Err(fault) => ctx.entry_fault(fault)?,
        }
    }
}

async fn read_random_access(
    ctx: &FollowerCtx,
    log: Arc<dyn RandomAccessLog>,
    catch_up: bool,
    queue: mpsc::Sender<Candidate>,
) -> SyncResult<()> {
    let ready = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => return Ok(()),
        ready = log.ready() => ready,
    };
    ready.map_err(|e| ctx.stream_fault(e))?;

    let mut appended = log.appended();
    let mut next = if catch_up { 0 } else { *appended.borrow() };
    ctx.running();

    loop {
        let newest = *appended.borrow_and_update();
        while next < newest {
            let read = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => return Ok(()),
                read = log.read_at(next, true) => read,
            };
            match read {
                Ok(entry) => match decode_entry(&ctx.log, &entry) {
                    Ok(candidate) => {
                        if !ctx.enqueue(&queue, candidate).await {
                            return Ok(());
                        }
                    }
                    Err(fault) => ctx.entry_fault(fault)?,
                },
                Err(e) => ctx.entry_fault(ctx.stream_fault(e))?,
            }
            next += 1;
        }
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Ok(()),
            changed = appended.changed() => {
                if changed.is_err() {
                    debug!(log = %ctx.log, "append notifications ended");
                    return Ok(());
                }
            }
        }
    }
}

async fn apply_queue(
    ctx: &FollowerCtx,
    mut queue: mpsc::Receiver<Candidate>,
    applier: Applier,
) -> SyncResult<()> {
    loop {
        let candidate = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Ok(()),
            candidate = queue.recv() => match candidate {
                Some(candidate) => candidate,
                None => return Ok(()),
            },
        };
        // Not raced against cancellation: an apply in flight completes.
        match applier.apply(candidate).await {
            Ok(ApplyOutcome::Inserted(_)) => ctx.status.send_modify(|s| s.applied += 1),
            Ok(ApplyOutcome::Skipped | ApplyOutcome::Conflict(_)) => {
                ctx.status.send_modify(|s| s.skipped += 1)
            }
            Err(e) if ctx.cancel.is_cancelled() => {
                debug!(log = %ctx.log, error = %e, "apply abandoned during shutdown");
                return Ok(());
            }
            Err(e) => {
                ctx.status.send_modify(|s| s.last_fault = Some(e.to_string()));
                // Store faults are fatal; take the reader down too.
                ctx.cancel.cancel();
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use bytes::Bytes;
    use logsync_log::{LogConfig, MemoryLog};
    use logsync_store::DocumentStore;
    use serde_json::json;

    use crate::applier::tests::ProbeStore;

    fn payload(value: serde_json::Value) -> Bytes {
        Bytes::from(serde_json::to_vec(&value).unwrap())
    }

    async fn wait_for(handle: &StreamHandle, pred: impl Fn(&FollowerStatus) -> bool) -> FollowerStatus {
        let mut rx = handle.subscribe();
        let status = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| pred(s)))
            .await
            .expect("follower did not reach expected status")
            .expect("status channel closed")
            .clone();
        status
    }

    fn setup() -> (Arc<ProbeStore>, Applier) {
        let store = Arc::new(ProbeStore::default());
        let applier = Applier::new(store.clone());
        (store, applier)
    }

    #[tokio::test]
    async fn live_follower_applies_history_and_new_entries_in_order() {
        let (store, applier) = setup();
        let log = Arc::new(MemoryLog::new(LogId::from_hex("ab12").unwrap(), LogConfig::default()));
        log.append(payload(json!({"n": 0}))).await.unwrap();

        let handle = spawn_follower(log.live_source(), applier, &SyncConfig::default());
        for n in 1..5 {
            log.append(payload(json!({"n": n}))).await.unwrap();
        }
        wait_for(&handle, |s| s.applied == 5).await;

        for n in 0..5u64 {
            let doc = store
                .get(&format!("ab12@{n}").into(), None)
                .await
                .unwrap()
                .into_document()
                .unwrap();
            assert_eq!(doc.field("n"), Some(&json!(n)));
            assert_eq!(doc.field("_seq"), Some(&json!(n)));
        }
        assert_eq!(handle.status().state, FollowerState::Running);
    }

    #[tokio::test]
    async fn refollowing_a_log_writes_nothing_new() {
        let (store, applier) = setup();
        let log = Arc::new(MemoryLog::new(LogId::derive("replay"), LogConfig::default()));
        for n in 0..3 {
            log.append(payload(json!({"n": n}))).await.unwrap();
        }

        let first = spawn_follower(log.live_source(), applier.clone(), &SyncConfig::default());
        wait_for(&first, |s| s.applied == 3).await;
        first.destroy();
        first.closed().await.unwrap();
        assert_eq!(store.write_count(), 3);

        let second = spawn_follower(log.live_source(), applier, &SyncConfig::default());
        wait_for(&second, |s| s.skipped == 3).await;
        assert_eq!(store.write_count(), 3);
        assert_eq!(second.status().applied, 0);
    }

    #[tokio::test]
    async fn random_access_follower_catches_up_and_follows_appends() {
        let (store, applier) = setup();
        let log = Arc::new(MemoryLog::read_only(LogId::from_hex("cd34").unwrap(), LogConfig::default()));
        log.ingest(payload(json!({"early": true}))).unwrap();

        let handle = spawn_follower(log.random_access_source(), applier, &SyncConfig::default());
        wait_for(&handle, |s| s.applied == 1).await;

        log.ingest(payload(json!({"late": 1}))).unwrap();
        log.ingest(payload(json!({"late": 2}))).unwrap();
        wait_for(&handle, |s| s.applied == 3).await;

        let doc = store.get(&"cd34@2".into(), None).await.unwrap().into_document().unwrap();
        assert_eq!(doc.field("late"), Some(&json!(2)));
        assert_eq!(doc.field("_key"), Some(&json!("cd34")));
        assert_eq!(doc.field("_seq"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn random_access_without_catch_up_skips_history() {
        let (store, applier) = setup();
        let log = Arc::new(MemoryLog::read_only(LogId::from_hex("ef56").unwrap(), LogConfig::default()));
        log.ingest(payload(json!({"old": true}))).unwrap();

        let config = SyncConfig {
            catch_up_random_access: false,
            ..SyncConfig::default()
        };
        let handle = spawn_follower(log.random_access_source(), applier, &config);
        wait_for(&handle, |s| s.state == FollowerState::Running).await;
        log.ingest(payload(json!({"new": true}))).unwrap();
        wait_for(&handle, |s| s.applied == 1).await;

        assert!(!store.get(&"ef56@0".into(), None).await.unwrap().is_found());
        assert!(store.get(&"ef56@1".into(), None).await.unwrap().is_found());
    }

    #[tokio::test]
    async fn decode_faults_are_counted_and_skipped_by_default() {
        let (store, applier) = setup();
        let log = Arc::new(MemoryLog::new(LogId::derive("faulty"), LogConfig::default()));
        log.append(Bytes::from_static(b"{not json")).await.unwrap();
        log.append(payload(json!({"ok": true}))).await.unwrap();

        let handle = spawn_follower(log.live_source(), applier, &SyncConfig::default());
        let status = wait_for(&handle, |s| s.applied == 1).await;
        assert_eq!(status.faults, 1);
        assert!(status.last_fault.unwrap().contains("cannot decode entry 0"));
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn stop_policy_fails_the_follower_on_decode_fault() {
        let (_store, applier) = setup();
        let log = Arc::new(MemoryLog::new(LogId::derive("strict"), LogConfig::default()));
        log.append(Bytes::from_static(b"[]")).await.unwrap();
        log.append(payload(json!({"never": "applied"}))).await.unwrap();

        let config = SyncConfig {
            on_entry_error: EntryErrorPolicy::Stop,
            ..SyncConfig::default()
        };
        let handle = spawn_follower(log.live_source(), applier, &config);
        handle.closed().await.unwrap();
        let status = handle.status();
        assert!(matches!(status.state, FollowerState::Failed(ref r) if r.contains("entry 0")));
        assert_eq!(status.applied, 0);
    }

    #[tokio::test]
    async fn store_fault_fails_only_this_follower() {
        let (store, applier) = setup();
        let bad = Arc::new(MemoryLog::new(LogId::derive("bad"), LogConfig::default()));
        let good = Arc::new(MemoryLog::new(LogId::derive("good"), LogConfig::default()));

        store.fail_writes.store(true, Ordering::SeqCst);
        bad.append(payload(json!({"x": 1}))).await.unwrap();
        let bad_handle = spawn_follower(bad.live_source(), applier.clone(), &SyncConfig::default());
        bad_handle.closed().await.unwrap();
        assert!(matches!(bad_handle.status().state, FollowerState::Failed(_)));

        store.fail_writes.store(false, Ordering::SeqCst);
        let good_handle = spawn_follower(good.live_source(), applier, &SyncConfig::default());
        good.append(payload(json!({"y": 1}))).await.unwrap();
        wait_for(&good_handle, |s| s.applied == 1).await;
    }

    #[tokio::test]
    async fn destroy_closes_an_idle_follower() {
        let (_store, applier) = setup();
        let log = Arc::new(MemoryLog::new(LogId::derive("idle"), LogConfig::default()));
        let handle = spawn_follower(log.live_source(), applier, &SyncConfig::default());
        wait_for(&handle, |s| s.state == FollowerState::Running).await;

        handle.destroy();
        tokio::time::timeout(Duration::from_secs(5), handle.closed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(handle.status().state, FollowerState::Closed);
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn closed_log_ends_follower_cleanly() {
        let (_store, applier) = setup();
        let log = Arc::new(MemoryLog::new(LogId::derive("ending"), LogConfig::default()));
        let handle = spawn_follower(log.live_source(), applier, &SyncConfig::default());
        wait_for(&handle, |s| s.state == FollowerState::Running).await;
        log.close();
        handle.closed().await.unwrap();
        assert_eq!(handle.status().state, FollowerState::Closed);
    }
}
