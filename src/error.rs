use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};

use crate::infrastructure::persistence::StoreError;

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorInfo,
}

#[derive(Serialize)]
struct ErrorInfo {
    code: &'static str,
    message: String,
    details: Value,
}

/// API-facing error type.
///
/// `Unavailable` marks retryable backend failures (durable-store errors on
/// the read path); callers are expected to retry, not to treat the slug as
/// missing.
#[derive(Debug)]
pub enum AppError {
    Validation { message: String, details: Value },
    NotFound { message: String, details: Value },
    Conflict { message: String, details: Value },
    Unavailable { message: String, details: Value },
    Internal { message: String, details: Value },
}

impl AppError {
    pub fn bad_request(message: impl Into<String>, details: Value) -> Self {
        Self::Validation {
            message: message.into(),
            details,
        }
    }
    pub fn not_found(message: impl Into<String>, details: Value) -> Self {
        Self::NotFound {
            message: message.into(),
            details,
        }
    }
    pub fn conflict(message: impl Into<String>, details: Value) -> Self {
        Self::Conflict {
            message: message.into(),
            details,
        }
    }
    pub fn unavailable(message: impl Into<String>, details: Value) -> Self {
        Self::Unavailable {
            message: message.into(),
            details,
        }
    }
    pub fn internal(message: impl Into<String>, details: Value) -> Self {
        Self::Internal {
            message: message.into(),
            details,
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (code, message) = match self {
            AppError::Validation { message, .. } => ("validation_error", message),
            AppError::NotFound { message, .. } => ("not_found", message),
            AppError::Conflict { message, .. } => ("conflict", message),
            AppError::Unavailable { message, .. } => ("service_unavailable", message),
            AppError::Internal { message, .. } => ("internal_error", message),
        };
        write!(f, "{code}: {message}")
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match self {
            AppError::Validation { message, details } => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                message,
                details,
            ),
            AppError::NotFound { message, details } => {
                (StatusCode::NOT_FOUND, "not_found", message, details)
            }
            AppError::Conflict { message, details } => {
                (StatusCode::CONFLICT, "conflict", message, details)
            }
            AppError::Unavailable { message, details } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                message,
                details,
            ),
            AppError::Internal { message, details } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                message,
                details,
            ),
        };

        let body = ErrorBody {
            error: ErrorInfo {
                code,
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Maps durable-store failures to API errors.
///
/// Slug conflicts become `Conflict`; everything else on the read/write
/// path is a retryable `Unavailable`, never `NotFound`.
pub fn map_store_error(e: StoreError) -> AppError {
    match e {
        StoreError::SlugExists => {
            AppError::conflict("Slug already exists", json!({}))
        }
        StoreError::Timeout => AppError::unavailable(
            "Storage timed out",
            json!({ "retryable": true }),
        ),
        StoreError::Database(e) => AppError::unavailable(
            "Storage error",
            json!({ "retryable": true, "reason": e.to_string() }),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_maps_from_slug_exists() {
        let err = map_store_error(StoreError::SlugExists);
        assert!(matches!(err, AppError::Conflict { .. }));
    }

    #[test]
    fn test_timeout_maps_to_unavailable() {
        let err = map_store_error(StoreError::Timeout);
        assert!(matches!(err, AppError::Unavailable { .. }));
    }

    #[test]
    fn test_display_includes_code() {
        let err = AppError::not_found("Slug not found", json!({}));
        assert!(err.to_string().starts_with("not_found"));
    }
}
