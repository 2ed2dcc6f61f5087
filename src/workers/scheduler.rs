//! Aggregation scheduler.
//!
//! One loop, three independent tickers sharing a cancellation signal:
//! expired-row cleanup, click-counter rotation into the durable store,
//! and metrics export. Every tick tolerates backend failure; the loop
//! never exits on error.

use crate::config::SchedulerConfig;
use crate::infrastructure::cache::{CLICK_COUNTER_KEY, CacheError, CacheStore};
use crate::infrastructure::persistence::LinkStore;
use crate::metrics::CacheMetrics;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Runs the scheduler until cancellation.
pub async fn run_scheduler(
    store: Arc<dyn LinkStore>,
    cache: Arc<dyn CacheStore>,
    metrics: Arc<CacheMetrics>,
    config: SchedulerConfig,
    cancel: CancellationToken,
) {
    info!("Scheduler started");

    let mut cleanup_tick = interval_at(
        Instant::now() + config.cleanup_interval,
        config.cleanup_interval,
    );
    let mut flush_tick = interval_at(
        Instant::now() + config.click_flush_interval,
        config.click_flush_interval,
    );
    let mut metrics_tick = interval_at(
        Instant::now() + config.metrics_interval,
        config.metrics_interval,
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Scheduler stopped");
                return;
            }
            _ = cleanup_tick.tick() => {
                cleanup_expired(store.as_ref()).await;
            }
            _ = flush_tick.tick() => {
                flush_clicks(store.as_ref(), cache.as_ref(), &config).await;
            }
            _ = metrics_tick.tick() => {
                metrics.export();
            }
        }
    }
}

async fn cleanup_expired(store: &dyn LinkStore) {
    match store.delete_expired().await {
        Ok(affected) => info!(affected, "Expired links removed"),
        Err(e) => error!("Cleanup failed: {e}"),
    }
}

/// Rotates the live click counter into the durable store.
///
/// The live hash is atomically renamed to a timestamped processing key,
/// so consumers keep incrementing a fresh counter while this tick reads
/// the retired one. Any step failing aborts the rest of the tick; the
/// processing key is kept for inspection rather than deleted, so counts
/// are never silently lost.
pub(crate) async fn flush_clicks(
    store: &dyn LinkStore,
    cache: &dyn CacheStore,
    config: &SchedulerConfig,
) {
    let processing_key = format!(
        "{}:processing:{}",
        CLICK_COUNTER_KEY,
        chrono::Utc::now().timestamp()
    );

    match cache
        .rename_with_ttl(CLICK_COUNTER_KEY, &processing_key, config.processing_key_ttl)
        .await
    {
        Ok(()) => {}
        Err(CacheError::NotFound) => {
            debug!("No pending clicks to rotate");
            return;
        }
        Err(e) => {
            error!("Click counter rotation failed: {e}");
            return;
        }
    }

    let raw = match cache.hash_get_all(&processing_key).await {
        Ok(raw) => raw,
        Err(e) => {
            error!(key = %processing_key, "Failed to read rotated clicks: {e}");
            return;
        }
    };

    let counts = match parse_counts(&raw) {
        Ok(counts) => counts,
        Err(field) => {
            error!(key = %processing_key, field = %field, "Rotated counter holds a non-numeric count");
            return;
        }
    };

    if counts.is_empty() {
        let _ = cache.delete(&processing_key).await;
        return;
    }

    let total: i64 = counts.values().sum();

    if let Err(e) = store.add_clicks(&counts).await {
        error!(key = %processing_key, "Failed to store clicks, key retained: {e}");
        return;
    }

    if let Err(e) = cache.delete(&processing_key).await {
        error!(key = %processing_key, "Failed to delete processed clicks: {e}");
        return;
    }

    info!(slugs = counts.len(), total, "Flushed clicks to storage");
}

fn parse_counts(raw: &HashMap<String, String>) -> Result<HashMap<String, i64>, String> {
    raw.iter()
        .map(|(slug, value)| {
            value
                .parse::<i64>()
                .map(|count| (slug.clone(), count))
                .map_err(|_| slug.clone())
        })
        .collect()
}
