//! Cache-backed token buckets shared across service instances.

use super::{LimitError, RateLimiter};
use crate::infrastructure::cache::CacheStore;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Token buckets stored per IP in the cache with TTL.
///
/// Each check reads the state, refills from the wall-clock gap since
/// `refilled_at`, then writes back: the decremented count on admit, the
/// refilled (but not decremented) count on deny. Read and write are two
/// operations, so concurrent checks for one IP may each see the same
/// token and over-admit slightly.
pub struct CacheRateLimiter {
    cache: Arc<dyn CacheStore>,
    rps: f64,
    burst: f64,
}

impl CacheRateLimiter {
    pub fn new(cache: Arc<dyn CacheStore>, rps: f64, burst: f64) -> Self {
        Self { cache, rps, burst }
    }
}

#[async_trait]
impl RateLimiter for CacheRateLimiter {
    async fn allow(&self, identity: &str) -> Result<bool, LimitError> {
        let state = self.cache.get_rate_limit(identity).await?;

        let Some(state) = state else {
            // First request from this IP: spend one token out of the burst.
            self.cache
                .store_rate_limit(identity, self.rps, self.burst - 1.0)
                .await?;
            return Ok(true);
        };

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or_default();
        let elapsed = (now - state.refilled_at).max(0) as f64 / 1e9;

        let tokens = self.burst.min(state.tokens + self.rps * elapsed);

        if tokens >= 1.0 {
            self.cache
                .store_rate_limit(identity, self.rps, tokens - 1.0)
                .await?;
            Ok(true)
        } else {
            self.cache
                .store_rate_limit(identity, self.rps, tokens)
                .await?;
            Ok(false)
        }
    }
}
