//! One-shot command endpoint.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use burner_core::protocol::{Command, ContextId, Response};

/// Header naming the page context a one-shot command comes from.
pub const CONTEXT_HEADER: &str = "x-burner-context";

/// POST /v1/commands - Handle a single command.
///
/// Command failures are returned in-band with status 200; only malformed
/// requests are HTTP errors. The header names an existing relay context;
/// socket connects for a context with no live `/v1/relay` connection fail
/// with `peer_unreachable`.
pub async fn post_command(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Command>, JsonRejection>,
) -> ApiResult<Json<Response>> {
    let context = headers
        .get(CONTEXT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ContextId::new)
        .ok_or_else(|| ApiError::BadRequest(format!("missing {CONTEXT_HEADER} header")))?;
    let Json(command) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    Ok(Json(state.dispatcher.handle(command, &context).await))
}
