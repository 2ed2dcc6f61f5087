//! Handler for link creation.

use axum::{Json, extract::State, http::StatusCode};
use serde_json::json;
use validator::Validate;

use crate::api::dto::{ShortenRequest, ShortenResponse};
use crate::error::AppError;
use crate::state::AppState;

/// Creates a short link.
///
/// # Endpoint
///
/// `POST /shorten`
///
/// Returns `201 Created` with the slug and absolute short URL. A taken
/// custom slug is a `409 Conflict`; the stored row is left untouched.
pub async fn shorten_handler(
    State(state): State<AppState>,
    Json(body): Json<ShortenRequest>,
) -> Result<(StatusCode, Json<ShortenResponse>), AppError> {
    body.validate().map_err(|e| {
        AppError::bad_request("Invalid request", json!({ "reason": e.to_string() }))
    })?;

    let slug = state
        .links
        .create(&body.long_url, body.custom_slug.as_deref())
        .await?;

    let short_url = format!("{}/{}", state.base_url.trim_end_matches('/'), slug);

    Ok((
        StatusCode::CREATED,
        Json(ShortenResponse { slug, short_url }),
    ))
}
