//! Page-side error types.

use thiserror::Error;

/// Failures of the page context.
#[derive(Debug, Error)]
pub enum PageError {
    /// The relay could not be reached or answered with a failure.
    #[error("relay error: {0}")]
    Relay(String),

    /// The relay answered with a response of the wrong shape.
    #[error("unexpected relay response to {command}")]
    UnexpectedResponse { command: &'static str },

    #[error("page sampling failed: {0}")]
    Probe(String),

    #[error("injection failed: {0}")]
    Injection(String),

    #[error("invalid challenge signatures: {0}")]
    Signatures(String),
}

/// Result type alias for page operations.
pub type PageResult<T> = std::result::Result<T, PageError>;
