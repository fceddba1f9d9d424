use logsync_types::LogId;

/// Errors produced by log operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogError {
    #[error("log {0} is not writable")]
    NotWritable(LogId),

    #[error("sequence {seq} is beyond the end of the log (length {len})")]
    OutOfRange { seq: u64, len: u64 },

    #[error("log is closed")]
    Closed,

    #[error("log is not ready")]
    NotReady,

    #[error("transport error: {0}")]
    Transport(String),
}

/// Result alias for log operations.
pub type LogResult<T> = Result<T, LogError>;
