//! Redis-backed cache store.

use super::store::{CacheError, CacheResult, CacheStore, RateLimitState};
use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Redis cache store.
///
/// Uses `ConnectionManager` for connection reuse and reconnection. Every
/// operation is bounded by the configured per-call deadline; an exceeded
/// deadline surfaces as [`CacheError::Timeout`].
pub struct RedisStore {
    client: ConnectionManager,
    op_timeout: Duration,
    url_ttl: Duration,
    ip_ttl: Duration,
}

impl RedisStore {
    /// Connects to Redis and validates the connection with a PING.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Connection`] if the URL is invalid, the
    /// connection cannot be established, or the PING fails. The caller
    /// treats this as fatal at startup.
    pub async fn connect(
        redis_url: &str,
        op_timeout: Duration,
        url_ttl: Duration,
        ip_ttl: Duration,
    ) -> CacheResult<Self> {
        info!("Connecting to Redis");

        let client = Client::open(redis_url).map_err(|e| {
            CacheError::Connection(format!("Failed to create Redis client: {}", e))
        })?;

        let manager = ConnectionManager::new(client).await.map_err(|e| {
            CacheError::Connection(format!("Failed to connect to Redis: {}", e))
        })?;

        let store = Self {
            client: manager,
            op_timeout,
            url_ttl,
            ip_ttl,
        };

        store.ping().await?;
        info!("Connected to Redis");

        Ok(store)
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = redis::RedisResult<T>>,
    ) -> CacheResult<T> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(map_redis_error(e)),
            Err(_) => Err(CacheError::Timeout),
        }
    }
}

fn map_redis_error(e: redis::RedisError) -> CacheError {
    if e.is_timeout() {
        return CacheError::Timeout;
    }

    // RENAME on an absent source key.
    let text = e.to_string();
    if text.contains("no such key") {
        return CacheError::NotFound;
    }

    if e.is_connection_refusal() || e.is_connection_dropped() {
        return CacheError::Connection(text);
    }

    CacheError::Operation(text)
}

fn url_key(slug: &str) -> String {
    format!("url:{slug}")
}

fn ip_key(ip: &str) -> String {
    format!("ip:{ip}")
}

pub(super) fn now_unix_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or_default()
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get_url(&self, slug: &str) -> CacheResult<Option<String>> {
        let key = url_key(slug);
        let mut conn = self.client.clone();

        let url = self
            .bounded(conn.get::<_, Option<String>>(&key))
            .await?;

        match &url {
            Some(_) => debug!(slug, "cache hit"),
            None => debug!(slug, "cache miss"),
        }

        Ok(url)
    }

    async fn set_url(&self, slug: &str, long_url: &str) -> CacheResult<()> {
        let key = url_key(slug);
        let mut conn = self.client.clone();

        self.bounded(conn.set_ex::<_, _, ()>(&key, long_url, self.url_ttl.as_secs()))
            .await
    }

    async fn hash_get_all(&self, key: &str) -> CacheResult<HashMap<String, String>> {
        let mut conn = self.client.clone();

        self.bounded(conn.hgetall::<_, HashMap<String, String>>(key))
            .await
    }

    async fn hash_increment_batch(
        &self,
        key: &str,
        counts: &HashMap<String, i64>,
    ) -> CacheResult<()> {
        let mut conn = self.client.clone();

        let mut pipe = redis::pipe();
        for (field, delta) in counts {
            pipe.hincr(key, field, *delta).ignore();
        }

        self.bounded(pipe.query_async::<()>(&mut conn)).await
    }

    async fn rename_with_ttl(&self, old: &str, new: &str, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.client.clone();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("RENAME")
            .arg(old)
            .arg(new)
            .ignore()
            .cmd("EXPIRE")
            .arg(new)
            .arg(ttl.as_secs())
            .ignore();

        self.bounded(pipe.query_async::<()>(&mut conn)).await
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.client.clone();

        self.bounded(conn.del::<_, i32>(key)).await?;
        Ok(())
    }

    async fn get_rate_limit(&self, ip: &str) -> CacheResult<Option<RateLimitState>> {
        let key = ip_key(ip);
        let mut conn = self.client.clone();

        let fields = self
            .bounded(conn.hgetall::<_, HashMap<String, String>>(&key))
            .await?;

        if fields.is_empty() {
            return Ok(None);
        }

        let parse = |name: &str| -> CacheResult<f64> {
            fields
                .get(name)
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| CacheError::Operation(format!("bad rate-limit field {name}")))
        };

        Ok(Some(RateLimitState {
            tokens: parse("tokens")?,
            rps: parse("rps")?,
            refilled_at: fields
                .get("refilled_at")
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| {
                    CacheError::Operation("bad rate-limit field refilled_at".to_string())
                })?,
        }))
    }

    async fn store_rate_limit(&self, ip: &str, rps: f64, tokens: f64) -> CacheResult<()> {
        let key = ip_key(ip);
        let mut conn = self.client.clone();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset_multiple(
                &key,
                &[
                    ("tokens", tokens.to_string()),
                    ("rps", rps.to_string()),
                    ("refilled_at", now_unix_nanos().to_string()),
                ],
            )
            .ignore()
            .cmd("EXPIRE")
            .arg(&key)
            .arg(self.ip_ttl.as_secs())
            .ignore();

        self.bounded(pipe.query_async::<()>(&mut conn)).await
    }

    async fn flush_all(&self) -> CacheResult<()> {
        let mut conn = self.client.clone();

        self.bounded(redis::cmd("FLUSHALL").query_async::<()>(&mut conn))
            .await
    }

    async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.client.clone();

        self.bounded(conn.ping::<()>()).await
    }
}
