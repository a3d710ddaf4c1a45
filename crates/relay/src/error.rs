//! Relay and API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use burner_core::protocol::Response as CommandResponse;
use burner_storage::StorageError;
use serde::Serialize;

/// Failures raised while serving a command.
///
/// None of these escape the command boundary: the dispatcher turns every one
/// of them into a structured failure response.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Network failure, non-success status or empty body.
    #[error("{0}")]
    FetchFailed(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StorageError),

    #[error("rule install failed: {0}")]
    RuleInstallFailed(String),

    #[error("socket {0} is not connected")]
    NotConnected(String),

    /// The originating page context has been torn down.
    #[error("peer unreachable: {0}")]
    PeerUnreachable(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("core error: {0}")]
    Core(#[from] burner_core::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::FetchFailed(_) => "fetch_failed",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::RuleInstallFailed(_) => "rule_install_failed",
            Self::NotConnected(_) => "not_connected",
            Self::PeerUnreachable(_) => "peer_unreachable",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Core(_) => "core_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// The in-band failure response for this error.
    pub fn to_response(&self) -> CommandResponse {
        CommandResponse::failure(self.to_string(), Some(self.code()))
    }
}

/// Result type for relay operations.
pub type RelayResult<T> = std::result::Result<T, RelayError>;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// Errors of the HTTP surface itself; command failures are returned in-band.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Relay(#[from] RelayError),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Unavailable(_) => "unavailable",
            Self::Relay(e) => e.code(),
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Relay(e) => match e {
                RelayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                RelayError::FetchFailed(_) => StatusCode::BAD_GATEWAY,
                RelayError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
