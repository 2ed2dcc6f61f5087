//! Cache hit/miss and drop accounting.
//!
//! One [`CacheMetrics`] instance is created at startup and shared by the
//! resolver, the pipeline and the scheduler. Counters accumulate with
//! relaxed atomics on the hot path; the scheduler's metrics tick calls
//! [`CacheMetrics::export`], which swaps each counter back to zero and
//! publishes the delta through the `metrics` facade, so a value is never
//! exported twice.

use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;

#[derive(Debug, Default)]
pub struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    dropped_clicks: AtomicU64,
}

/// Deltas drained by one [`CacheMetrics::swap`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsDelta {
    pub hits: u64,
    pub misses: u64,
    pub dropped_clicks: u64,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a click event shed by a full buffer (resolver -> producer or
    /// fetch -> aggregation handoff).
    pub fn record_dropped_click(&self) {
        self.dropped_clicks.fetch_add(1, Ordering::Relaxed);
    }

    /// Atomically drains all counters, resetting them to zero.
    pub fn swap(&self) -> MetricsDelta {
        MetricsDelta {
            hits: self.hits.swap(0, Ordering::Relaxed),
            misses: self.misses.swap(0, Ordering::Relaxed),
            dropped_clicks: self.dropped_clicks.swap(0, Ordering::Relaxed),
        }
    }

    /// Drains the counters and publishes non-zero deltas.
    pub fn export(&self) {
        let delta = self.swap();

        if delta.hits > 0 {
            counter!("cache_hits_total").increment(delta.hits);
        }
        if delta.misses > 0 {
            counter!("cache_misses_total").increment(delta.misses);
        }
        if delta.dropped_clicks > 0 {
            counter!("clicks_dropped_total").increment(delta.dropped_clicks);
        }
    }
}
