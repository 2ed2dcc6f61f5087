//! Route table.

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::api::handlers::{health_handler, redirect_handler, shorten_handler};
use crate::api::middleware::rate_limit::rate_limit;
use crate::state::AppState;

/// Builds the application router.
///
/// The redirect and shorten routes sit behind the per-IP rate limiter;
/// health does not.
pub fn app_router(state: AppState) -> Router {
    let limited = Router::new()
        .route("/{slug}", get(redirect_handler))
        .route("/shorten", post(shorten_handler))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .route("/health", get(health_handler))
        .merge(limited)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
