//! Per-IP rate limiting middleware.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use tracing::error;

use crate::state::AppState;

/// Applies the configured [`crate::ratelimit::RateLimiter`] per client
/// IP. Denied requests receive `429 Too Many Requests`; a limiter
/// backend failure is a `500`, matching the admission check being a
/// prerequisite rather than best-effort telemetry.
///
/// The peer address comes from request extensions, populated when the
/// server runs with connect info; requests without one (some test
/// harnesses) share a single `unknown` bucket.
pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    match state.limiter.allow(&ip).await {
        Ok(true) => next.run(request).await,
        Ok(false) => StatusCode::TOO_MANY_REQUESTS.into_response(),
        Err(e) => {
            error!(%ip, "Rate limiter check failed: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
