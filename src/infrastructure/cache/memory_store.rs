//! In-process cache store.
//!
//! Functional stand-in for Redis used by tests and by the cache-backed
//! rate limiter's unit tests. Implements the same key semantics: string
//! entries honor TTL lazily on read, hashes are moved wholesale by
//! rename, and rate-limit state is stamped at write time.

use super::redis_store::now_unix_nanos;
use super::store::{CacheError, CacheResult, CacheStore, RateLimitState};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Default)]
struct Inner {
    strings: HashMap<String, (String, Option<Instant>)>,
    hashes: HashMap<String, HashMap<String, i64>>,
    limits: HashMap<String, RateLimitState>,
}

/// In-memory [`CacheStore`].
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    url_ttl: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose cached URLs expire after `ttl`.
    pub fn with_url_ttl(ttl: Duration) -> Self {
        Self {
            inner: Mutex::default(),
            url_ttl: Some(ttl),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Total pending count across all fields of a hash. Test helper.
    pub fn hash_total(&self, key: &str) -> i64 {
        self.lock()
            .hashes
            .get(key)
            .map(|h| h.values().sum())
            .unwrap_or(0)
    }

    /// Whether a hash key currently exists. Test helper.
    pub fn hash_exists(&self, key: &str) -> bool {
        self.lock().hashes.contains_key(key)
    }

    /// Hash keys starting with `prefix`. Test helper.
    pub fn hash_keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.lock()
            .hashes
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get_url(&self, slug: &str) -> CacheResult<Option<String>> {
        let key = format!("url:{slug}");
        let mut inner = self.lock();

        match inner.strings.get(&key) {
            Some((_, Some(deadline))) if *deadline <= Instant::now() => {
                inner.strings.remove(&key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn set_url(&self, slug: &str, long_url: &str) -> CacheResult<()> {
        let key = format!("url:{slug}");
        let deadline = self.url_ttl.map(|ttl| Instant::now() + ttl);

        self.lock()
            .strings
            .insert(key, (long_url.to_string(), deadline));
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> CacheResult<HashMap<String, String>> {
        Ok(self
            .lock()
            .hashes
            .get(key)
            .map(|h| {
                h.iter()
                    .map(|(field, count)| (field.clone(), count.to_string()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn hash_increment_batch(
        &self,
        key: &str,
        counts: &HashMap<String, i64>,
    ) -> CacheResult<()> {
        let mut inner = self.lock();
        let hash = inner.hashes.entry(key.to_string()).or_default();

        for (field, delta) in counts {
            *hash.entry(field.clone()).or_insert(0) += delta;
        }

        Ok(())
    }

    async fn rename_with_ttl(&self, old: &str, new: &str, _ttl: Duration) -> CacheResult<()> {
        let mut inner = self.lock();

        let hash = inner.hashes.remove(old).ok_or(CacheError::NotFound)?;
        inner.hashes.insert(new.to_string(), hash);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut inner = self.lock();
        inner.strings.remove(key);
        inner.hashes.remove(key);
        Ok(())
    }

    async fn get_rate_limit(&self, ip: &str) -> CacheResult<Option<RateLimitState>> {
        Ok(self.lock().limits.get(ip).copied())
    }

    async fn store_rate_limit(&self, ip: &str, rps: f64, tokens: f64) -> CacheResult<()> {
        self.lock().limits.insert(
            ip.to_string(),
            RateLimitState {
                tokens,
                rps,
                refilled_at: now_unix_nanos(),
            },
        );
        Ok(())
    }

    async fn flush_all(&self) -> CacheResult<()> {
        let mut inner = self.lock();
        inner.strings.clear();
        inner.hashes.clear();
        inner.limits.clear();
        Ok(())
    }

    async fn ping(&self) -> CacheResult<()> {
        Ok(())
    }
}
