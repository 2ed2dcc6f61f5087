//! Cache store trait and error types.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Hash key the consumer fleet increments pending clicks into.
///
/// The scheduler rotates this key away atomically; consumers keep writing
/// and the key simply reappears empty.
pub const CLICK_COUNTER_KEY: &str = "clicks";

/// Errors from cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache connection error: {0}")]
    Connection(String),
    #[error("cache operation timed out")]
    Timeout,
    #[error("key not found")]
    NotFound,
    #[error("cache operation error: {0}")]
    Operation(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Token-bucket state stored per client IP.
///
/// `refilled_at` is unix nanoseconds; the state is created lazily on the
/// first request from an IP and destroyed by TTL expiry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitState {
    pub tokens: f64,
    pub rps: f64,
    pub refilled_at: i64,
}

/// Key-value store with TTL, hash-field increment and atomic
/// rename-with-TTL primitives.
///
/// Implementations bound every operation with their configured deadline;
/// an exceeded deadline surfaces as [`CacheError::Timeout`], never as a
/// hang or a panic. Callers on best-effort paths log and continue.
///
/// # Implementations
///
/// - [`crate::infrastructure::cache::RedisStore`] - production store
/// - [`crate::infrastructure::cache::MemoryStore`] - in-process store for
///   tests and cache-backed-component tests
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Looks up the cached destination URL for a slug.
    ///
    /// Returns `Ok(None)` on a clean miss; errors are real backend
    /// failures, which resolver callers degrade to a durable-store read.
    async fn get_url(&self, slug: &str) -> CacheResult<Option<String>>;

    /// Caches `slug -> long_url` with the store's configured URL TTL.
    async fn set_url(&self, slug: &str, long_url: &str) -> CacheResult<()>;

    /// Reads an entire hash.
    async fn hash_get_all(&self, key: &str) -> CacheResult<HashMap<String, String>>;

    /// Applies every `(field, delta)` pair to `key` in one round trip.
    async fn hash_increment_batch(
        &self,
        key: &str,
        counts: &HashMap<String, i64>,
    ) -> CacheResult<()>;

    /// Atomically renames `old` to `new` and sets `ttl` on the new key.
    ///
    /// Returns [`CacheError::NotFound`] when `old` does not exist (an
    /// idle counter), which callers treat as "nothing to rotate".
    async fn rename_with_ttl(&self, old: &str, new: &str, ttl: Duration) -> CacheResult<()>;

    /// Deletes a key. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Reads the rate-limit bucket for an IP, if present.
    async fn get_rate_limit(&self, ip: &str) -> CacheResult<Option<RateLimitState>>;

    /// Writes the rate-limit bucket for an IP, refreshing its TTL and
    /// stamping `refilled_at` with the current time.
    async fn store_rate_limit(&self, ip: &str, rps: f64, tokens: f64) -> CacheResult<()>;

    /// Removes everything. Test/cleanup use only.
    async fn flush_all(&self) -> CacheResult<()>;

    /// Connectivity check, fatal at startup only.
    async fn ping(&self) -> CacheResult<()>;
}
