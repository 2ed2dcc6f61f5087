//! Per-process token buckets.

use super::{LimitError, RateLimiter};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

/// Token buckets held in a guarded map, one per source IP.
///
/// Simplest strategy; buckets are not shared across service instances,
/// so a fleet admits up to `instances * burst` before refill.
pub struct InProcessRateLimiter {
    rps: f64,
    burst: f64,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl InProcessRateLimiter {
    pub fn new(rps: f64, burst: f64) -> Self {
        Self {
            rps,
            burst,
            buckets: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl RateLimiter for InProcessRateLimiter {
    async fn allow(&self, identity: &str) -> Result<bool, LimitError> {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());

        let bucket = buckets.entry(identity.to_string()).or_insert(Bucket {
            tokens: self.burst,
            refilled_at: now,
        });

        let elapsed = now.duration_since(bucket.refilled_at).as_secs_f64();
        bucket.tokens = self.burst.min(bucket.tokens + self.rps * elapsed);
        bucket.refilled_at = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
