//! Storage error types.

use thiserror::Error;

/// Key-value store errors.
///
/// Callers above this crate collapse every variant into a single
/// "store unavailable" kind; the variants exist for logs.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt {namespace} store document: {reason}")]
    Corrupt {
        namespace: &'static str,
        reason: String,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("store rejected the operation: {0}")]
    Rejected(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
