//! Destination URL validation.

use crate::error::AppError;
use serde_json::json;
use url::Url;

/// Maximum accepted destination URL length.
pub const MAX_URL_LENGTH: usize = 2048;

/// Validates a destination URL before it is shortened.
///
/// Accepts absolute `http`/`https` URLs up to [`MAX_URL_LENGTH`]
/// characters with a non-empty host.
///
/// # Errors
///
/// Returns [`AppError::Validation`] describing the first violated rule.
pub fn validate_url(raw: &str) -> Result<(), AppError> {
    if raw.is_empty() {
        return Err(AppError::bad_request("URL must not be empty", json!({})));
    }

    if raw.len() > MAX_URL_LENGTH {
        return Err(AppError::bad_request(
            "URL is too long",
            json!({ "max_length": MAX_URL_LENGTH, "provided_length": raw.len() }),
        ));
    }

    let parsed = Url::parse(raw).map_err(|e| {
        AppError::bad_request("Invalid URL", json!({ "reason": e.to_string() }))
    })?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(AppError::bad_request(
            "URL scheme must be http or https",
            json!({ "scheme": parsed.scheme() }),
        ));
    }

    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(AppError::bad_request(
            "URL must have a host",
            json!({ "url": raw }),
        ));
    }

    Ok(())
}
