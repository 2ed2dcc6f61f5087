//! Handler for short URL redirect.

use axum::{
    extract::{Path, State},
    response::Redirect,
};

use crate::error::AppError;
use crate::state::AppState;

/// Redirects a slug to its destination URL.
///
/// # Endpoint
///
/// `GET /{slug}`
///
/// The service resolves cache-aside and emits the click event; this
/// handler only maps the outcome to a 308 or an error response.
pub async fn redirect_handler(
    Path(slug): Path<String>,
    State(state): State<AppState>,
) -> Result<Redirect, AppError> {
    let long_url = state.links.resolve(&slug).await?;

    Ok(Redirect::permanent(&long_url))
}
