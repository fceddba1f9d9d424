use logsync_types::TypeError;

/// Faults from document store operations.
///
/// A missing document is not represented here; see [`crate::Lookup`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store has been destroyed and accepts no further operations.
    #[error("store has been destroyed")]
    Destroyed,

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A document value could not be interpreted.
    #[error("invalid document: {0}")]
    InvalidDocument(#[from] TypeError),

    /// Failure reported by the underlying storage backend.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
