//! Short link entity.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A short link as the durable store owns it.
///
/// Cached copies under `url:<slug>` are derived, TTL-bounded and
/// non-authoritative. The stored click count lives beside this row and
/// lags the true total by whatever is still in flight through the
/// aggregation pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct ShortLink {
    pub slug: String,
    pub long_url: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ShortLink {
    /// Builds a new link stamped `now`, expiring after `ttl`.
    pub fn new(slug: String, long_url: String, ttl: chrono::Duration) -> Self {
        let now = Utc::now();
        Self {
            slug,
            long_url,
            created_at: now,
            expires_at: now + ttl,
        }
    }
}
