//! Token-bucket admission control.
//!
//! Two interchangeable strategies behind one trait: a per-process bucket
//! map, and a cache-backed variant whose bucket state is shared by every
//! service instance. Both refill lazily on each check; there is no
//! background refill timer.

mod cache_backed;
mod in_process;

pub use cache_backed::CacheRateLimiter;
pub use in_process::InProcessRateLimiter;

use crate::infrastructure::cache::CacheError;
use async_trait::async_trait;

/// Errors from an admission check.
#[derive(Debug, thiserror::Error)]
pub enum LimitError {
    #[error("rate limit state error: {0}")]
    Cache(#[from] CacheError),
}

/// Admission control for one identity (client IP).
///
/// Rate limiting is a soft guarantee: the cache-backed strategy reads and
/// writes bucket state non-transactionally, so a few extra admits under
/// concurrent requests from one IP are possible and accepted.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Returns whether one request from `identity` is admitted now.
    async fn allow(&self, identity: &str) -> Result<bool, LimitError>;
}
