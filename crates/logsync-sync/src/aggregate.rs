//! Discovery of logs announced by a [`LogAggregator`].

use std::sync::Arc;

use logsync_log::{LogAggregator, LogSource};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{SyncError, SyncResult};

/// Handle to one aggregate discovery task.
#[derive(Debug)]
pub(crate) struct AggregateHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl AggregateHandle {
    pub(crate) fn destroy(&self) {
        self.cancel.cancel();
    }

    /// Wait for the discovery task to finish.
    pub(crate) async fn closed(mut self) -> SyncResult<()> {
        (&mut self.task)
            .await
            .map_err(|e| SyncError::Teardown(format!("aggregate discovery task: {e}")))
    }
}

impl Drop for AggregateHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Spawn a task that hands every log `aggregator` knows about, now or later,
/// to `register`.
///
/// `register` returns whether the log was newly followed. An error from it
/// ends discovery.
pub(crate) fn spawn_discovery<F>(aggregator: Arc<dyn LogAggregator>, register: F) -> AggregateHandle
where
    F: Fn(LogSource) -> SyncResult<bool> + Send + Sync + 'static,
{
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let task = tokio::spawn(async move {
        match discover(aggregator.as_ref(), &register, &token).await {
            Ok(()) | Err(SyncError::Destroyed) => debug!("aggregate discovery stopped"),
            Err(e) => error!(error = %e, "aggregate discovery failed"),
        }
    });
    AggregateHandle { cancel, task }
}

async fn discover<F>(
    aggregator: &dyn LogAggregator,
    register: &F,
    cancel: &CancellationToken,
) -> SyncResult<()>
where
    F: Fn(LogSource) -> SyncResult<bool>,
{
    // Subscribe first so nothing announced while waiting for ready is missed.
    let mut announcements = aggregator.subscribe_new_logs();
    let ready = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Ok(()),
        ready = aggregator.ready() => ready,
    };
    ready.map_err(SyncError::Aggregator)?;

    let added = register_all(aggregator, register)?;
    info!(added, "aggregate initial logs followed");

    loop {
        let announced = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            announced = announcements.recv() => announced,
        };
        match announced {
            Ok(source) => {
                let id = source.id();
                if register(source)? {
                    info!(log = %id, "aggregate announced new log");
                }
            }
            Err(RecvError::Lagged(missed)) => {
                warn!(missed, "aggregate announcements lagged; rescanning");
                register_all(aggregator, register)?;
            }
            Err(RecvError::Closed) => {
                debug!("aggregate announcements closed");
                return Ok(());
            }
        }
    }
}

fn register_all<F>(aggregator: &dyn LogAggregator, register: &F) -> SyncResult<usize>
where
    F: Fn(LogSource) -> SyncResult<bool>,
{
    let mut added = 0;
    for source in aggregator.current_logs() {
        if register(source)? {
            added += 1;
        }
    }
    Ok(added)
}
