//! Request/response bodies for the shorten endpoint.

use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct ShortenRequest {
    /// Destination URL. Scheme and shape are re-checked by the service;
    /// the DTO bound exists to reject oversized bodies early.
    #[validate(length(min = 1, max = 2048), url)]
    pub long_url: String,

    /// Optional caller-chosen slug; empty means "generate one".
    #[serde(default)]
    pub custom_slug: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ShortenResponse {
    pub slug: String,
    pub short_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_request_passes_validation() {
        let req = ShortenRequest {
            long_url: "https://example.com/page".to_string(),
            custom_slug: None,
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_non_url_fails_validation() {
        let req = ShortenRequest {
            long_url: "not a url".to_string(),
            custom_slug: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_oversized_url_fails_validation() {
        let req = ShortenRequest {
            long_url: format!("https://example.com/{}", "a".repeat(2048)),
            custom_slug: None,
        };
        assert!(req.validate().is_err());
    }
}
