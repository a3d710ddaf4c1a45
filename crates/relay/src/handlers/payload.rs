//! Cached payload endpoint.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

/// GET /v1/payload - The cached payload, fetching it first if never cached.
pub async fn get_payload(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let payload = state.updater.get_cached_payload().await;
    if payload.is_empty() {
        return Err(ApiError::Unavailable("no payload cached".to_string()));
    }
    Ok((
        [
            (header::CONTENT_TYPE, "text/javascript; charset=utf-8"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        payload,
    ))
}
