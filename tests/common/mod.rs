#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shortlink::domain::entities::ShortLink;
use shortlink::infrastructure::persistence::{LinkStore, StoreError, StoreResult};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

struct Row {
    long_url: String,
    clicks: i64,
    expires_at: DateTime<Utc>,
}

/// In-memory [`LinkStore`] with call counting and a failure toggle, so
/// pipeline tests can assert exact durable totals without a database.
#[derive(Default)]
pub struct MemoryLinkStore {
    rows: Mutex<HashMap<String, Row>>,
    find_calls: AtomicUsize,
    fail_add_clicks: AtomicBool,
}

impl MemoryLinkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clicks(&self, slug: &str) -> i64 {
        self.rows
            .lock()
            .unwrap()
            .get(slug)
            .map(|row| row.clicks)
            .unwrap_or(0)
    }

    pub fn long_url(&self, slug: &str) -> Option<String> {
        self.rows
            .lock()
            .unwrap()
            .get(slug)
            .map(|row| row.long_url.clone())
    }

    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::Relaxed)
    }

    /// Makes every subsequent `add_clicks` fail with a timeout.
    pub fn fail_add_clicks(&self, fail: bool) {
        self.fail_add_clicks.store(fail, Ordering::Relaxed);
    }

    pub fn insert_expired(&self, slug: &str, long_url: &str) {
        self.rows.lock().unwrap().insert(
            slug.to_string(),
            Row {
                long_url: long_url.to_string(),
                clicks: 0,
                expires_at: Utc::now() - chrono::Duration::hours(1),
            },
        );
    }
}

#[async_trait]
impl LinkStore for MemoryLinkStore {
    async fn insert(&self, link: ShortLink) -> StoreResult<()> {
        let mut rows = self.rows.lock().unwrap();

        if rows.contains_key(&link.slug) {
            return Err(StoreError::SlugExists);
        }

        rows.insert(
            link.slug,
            Row {
                long_url: link.long_url,
                clicks: 0,
                expires_at: link.expires_at,
            },
        );
        Ok(())
    }

    async fn find_long_url(&self, slug: &str) -> StoreResult<Option<String>> {
        self.find_calls.fetch_add(1, Ordering::Relaxed);

        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(slug)
            .filter(|row| row.expires_at > Utc::now())
            .map(|row| row.long_url.clone()))
    }

    async fn add_clicks(&self, counts: &HashMap<String, i64>) -> StoreResult<()> {
        if self.fail_add_clicks.load(Ordering::Relaxed) {
            return Err(StoreError::Timeout);
        }

        let mut rows = self.rows.lock().unwrap();
        for (slug, delta) in counts {
            if let Some(row) = rows.get_mut(slug) {
                row.clicks += delta;
            }
        }
        Ok(())
    }

    async fn delete_expired(&self) -> StoreResult<u64> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|_, row| row.expires_at > Utc::now());
        Ok((before - rows.len()) as u64)
    }

    async fn truncate(&self) -> StoreResult<()> {
        self.rows.lock().unwrap().clear();
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Polls `condition` until it holds or `timeout` elapses.
pub async fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;

    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    condition()
}
