use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("log identity must not be empty")]
    EmptyLogId,

    #[error("invalid revision token: {0}")]
    InvalidRevision(String),

    #[error("invalid derived key: {0}")]
    InvalidDerivedKey(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
