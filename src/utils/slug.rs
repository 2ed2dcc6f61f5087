//! Slug generation and validation.
//!
//! Slugs are fixed-length identifiers drawn from a 62-character
//! alphanumeric alphabet. Generation uses OS entropy; uniqueness is
//! enforced by the database constraint at insert time, not pre-checked.

use crate::error::AppError;
use serde_json::json;

/// Alphabet used for generated slugs.
pub const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Fixed slug length.
pub const SLUG_LENGTH: usize = 7;

/// Generates a cryptographically secure random slug of [`SLUG_LENGTH`].
///
/// Bytes are rejection-sampled so every alphabet character is equally
/// likely (values >= 248 are discarded instead of taken modulo 62).
///
/// # Errors
///
/// Returns [`AppError::Internal`] if the system random number generator
/// fails.
pub fn generate_slug() -> Result<String, AppError> {
    // Largest multiple of 62 that fits in a byte.
    const LIMIT: u8 = 248;

    let mut slug = Vec::with_capacity(SLUG_LENGTH);
    let mut buffer = [0u8; 16];

    while slug.len() < SLUG_LENGTH {
        getrandom::fill(&mut buffer).map_err(|e| {
            AppError::internal(
                "Random number generator failure",
                json!({ "reason": e.to_string() }),
            )
        })?;

        for byte in buffer {
            if byte < LIMIT {
                slug.push(ALPHABET[(byte % 62) as usize]);

                if slug.len() == SLUG_LENGTH {
                    break;
                }
            }
        }
    }

    // Alphabet bytes are ASCII.
    Ok(String::from_utf8(slug).expect("slug is ASCII"))
}

/// Validates that `slug` has the exact generated shape: [`SLUG_LENGTH`]
/// characters, all from [`ALPHABET`].
pub fn validate_slug(slug: &str) -> Result<(), AppError> {
    if slug.len() != SLUG_LENGTH {
        return Err(AppError::bad_request(
            "Slug must be exactly 7 characters",
            json!({ "provided_length": slug.len() }),
        ));
    }

    if !slug.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::bad_request(
            "Slug may only contain ASCII letters and digits",
            json!({ "slug": slug }),
        ));
    }

    Ok(())
}
