//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid version: {0}")]
    InvalidVersion(String),

    #[error("invalid rule: {0}")]
    InvalidRule(String),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("invalid stored value for {key}: {reason}")]
    InvalidStoredValue { key: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
