use std::path::PathBuf;

use logsync_log::LogError;
use logsync_store::StoreError;
use logsync_types::{DocKey, LogId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no owned log configured; call set_owned_log before writing")]
    NoOwnedLog,

    #[error("log {0} is not writable; follow it instead of owning it")]
    NotWritable(LogId),

    #[error("log {0} is the owned log and cannot be unfollowed")]
    OwnedLogPinned(LogId),

    #[error("store fault: {0}")]
    Store(#[from] StoreError),

    #[error("document {key} was written but not forwarded: {source}")]
    Append {
        key: DocKey,
        #[source]
        source: LogError,
    },

    #[error("document {0} vanished between write and forward")]
    VanishedAfterWrite(DocKey),

    #[error("stream fault on {log}: {reason}")]
    Stream { log: LogId, reason: String },

    #[error("cannot decode entry {seq} of {log}: {reason}")]
    Decode { log: LogId, seq: u64, reason: String },

    #[error("aggregator fault: {0}")]
    Aggregator(#[source] LogError),

    #[error("teardown fault: {0}")]
    Teardown(String),

    #[error("internal fault: {0}")]
    Internal(String),

    #[error("store has been destroyed")]
    Destroyed,

    #[error("invalid configuration in {path}: {reason}")]
    Config { path: PathBuf, reason: String },
}

pub type SyncResult<T> = Result<T, SyncError>;
