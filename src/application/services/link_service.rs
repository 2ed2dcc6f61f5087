//! Slug resolution and link creation.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tracing::warn;

use crate::domain::entities::ShortLink;
use crate::error::{AppError, map_store_error};
use crate::infrastructure::cache::CacheStore;
use crate::infrastructure::persistence::{LinkStore, StoreError};
use crate::metrics::CacheMetrics;
use crate::utils::slug::{generate_slug, validate_slug};
use crate::utils::url_check::validate_url;

/// Resolves slugs cache-aside over the durable store and creates links.
///
/// Every successful resolution emits exactly one click event into the
/// producer buffer with non-blocking semantics: a saturated analytics
/// pipeline never adds latency or failure to the redirect path.
pub struct LinkService {
    store: Arc<dyn LinkStore>,
    cache: Arc<dyn CacheStore>,
    clicks: mpsc::Sender<String>,
    metrics: Arc<CacheMetrics>,
    url_expiration: Duration,
}

impl LinkService {
    pub fn new(
        store: Arc<dyn LinkStore>,
        cache: Arc<dyn CacheStore>,
        clicks: mpsc::Sender<String>,
        metrics: Arc<CacheMetrics>,
        url_expiration: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            clicks,
            metrics,
            url_expiration,
        }
    }

    /// Resolves a slug to its destination URL.
    ///
    /// Read path: shape check, cache, durable store. A malformed slug is
    /// a not-found outcome with zero backend access. A cache backend
    /// error degrades to the durable-store read; a durable-store error
    /// surfaces as [`AppError::Unavailable`], never as a redirect.
    pub async fn resolve(&self, slug: &str) -> Result<String, AppError> {
        if validate_slug(slug).is_err() {
            return Err(AppError::not_found("Slug not found", json!({ "slug": slug })));
        }

        match self.cache.get_url(slug).await {
            Ok(Some(long_url)) => {
                self.metrics.record_hit();
                self.emit_click(slug);
                return Ok(long_url);
            }
            Ok(None) => {
                self.metrics.record_miss();
            }
            Err(e) => {
                warn!(slug, "Cache read failed, falling back to storage: {e}");
                self.metrics.record_miss();
            }
        }

        let long_url = self
            .store
            .find_long_url(slug)
            .await
            .map_err(map_store_error)?
            .ok_or_else(|| AppError::not_found("Slug not found", json!({ "slug": slug })))?;

        if let Err(e) = self.cache.set_url(slug, &long_url).await {
            warn!(slug, "Cache write-through failed: {e}");
        }

        self.emit_click(slug);
        Ok(long_url)
    }

    /// Creates a short link and returns its slug.
    ///
    /// With no custom slug, one is generated from OS entropy; collisions
    /// are left to the store's uniqueness constraint rather than
    /// pre-checked, and surface as [`AppError::Conflict`].
    pub async fn create(
        &self,
        long_url: &str,
        custom_slug: Option<&str>,
    ) -> Result<String, AppError> {
        validate_url(long_url)?;

        let slug = match custom_slug.filter(|s| !s.is_empty()) {
            Some(custom) => {
                validate_slug(custom)?;
                custom.to_string()
            }
            None => generate_slug()?,
        };

        let link = ShortLink::new(
            slug.clone(),
            long_url.to_string(),
            chrono::Duration::seconds(self.url_expiration.as_secs() as i64),
        );

        self.store.insert(link).await.map_err(|e| match e {
            StoreError::SlugExists => AppError::conflict(
                "Slug already exists",
                json!({ "slug": slug }),
            ),
            other => map_store_error(other),
        })?;

        Ok(slug)
    }

    /// Non-blocking click emission; a full producer buffer sheds the
    /// event rather than delaying the redirect.
    fn emit_click(&self, slug: &str) {
        match self.clicks.try_send(slug.to_string()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(slug, "Producer buffer full, dropping click event");
                self.metrics.record_dropped_click();
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(slug, "Producer buffer closed, dropping click event");
            }
        }
    }
}
