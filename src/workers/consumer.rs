//! Click event consumer.
//!
//! Each consumer instance runs two cooperating loops. The fetch loop
//! pulls messages one at a time, hands payloads to the aggregation loop
//! over a bounded channel (dropping on overflow rather than stalling
//! offset progress), and tracks per-partition commit batches. The
//! aggregation loop folds slugs into an in-memory count map and flushes
//! it to the cache-resident click counter on a size threshold or timer.
//!
//! Offsets are committed only for messages already handed to aggregation,
//! so a crash redelivers at most the uncommitted tail. Redelivered
//! increments are added again; that bounded overcount is the accepted
//! cost of at-least-once delivery.

use crate::config::ChannelConfig;
use crate::infrastructure::cache::{CLICK_COUNTER_KEY, CacheStore};
use crate::infrastructure::channel::{ChannelError, ClickReader, FetchedMessage};
use crate::metrics::CacheMetrics;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Runs one consumer instance until cancellation.
///
/// Spawns the fetch loop internally and runs the aggregation loop in
/// place; returns once both have exited.
pub async fn run_consumer(
    id: usize,
    reader: Arc<dyn ClickReader>,
    cache: Arc<dyn CacheStore>,
    metrics: Arc<CacheMetrics>,
    config: ChannelConfig,
    cancel: CancellationToken,
) {
    let (handoff_tx, handoff_rx) = mpsc::channel(config.handoff_capacity);

    let fetcher = tokio::spawn(run_fetcher(
        id,
        reader,
        handoff_tx,
        metrics.clone(),
        config.clone(),
        cancel.clone(),
    ));

    run_aggregator(id, handoff_rx, cache, config, cancel).await;

    let _ = fetcher.await;
    info!(consumer = id, "Consumer stopped");
}

/// Fetch loop: pulls messages, forwards payloads, batches offset commits
/// per partition.
async fn run_fetcher(
    id: usize,
    reader: Arc<dyn ClickReader>,
    handoff: mpsc::Sender<String>,
    metrics: Arc<CacheMetrics>,
    config: ChannelConfig,
    cancel: CancellationToken,
) {
    // One pre-sized batch per known partition, truncated after each
    // commit so capacity is reused across the life of the loop.
    let mut batches: Vec<Vec<FetchedMessage>> = (0..config.partitions)
        .map(|_| Vec::with_capacity(config.commit_batch_size))
        .collect();

    let mut commit_tick = interval_at(
        Instant::now() + config.commit_interval,
        config.commit_interval,
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                commit_all(id, reader.as_ref(), &mut batches, &config).await;
                info!(consumer = id, "Fetcher stopped");
                return;
            }
            _ = commit_tick.tick() => {
                commit_all(id, reader.as_ref(), &mut batches, &config).await;
            }
            fetched = reader.fetch() => {
                match fetched {
                    Ok(msg) => handle_message(id, reader.as_ref(), &handoff, &metrics, &mut batches, &config, msg).await,
                    Err(ChannelError::Closed) => {
                        commit_all(id, reader.as_ref(), &mut batches, &config).await;
                        info!(consumer = id, "Channel closed, fetcher stopped");
                        return;
                    }
                    Err(e) => {
                        error!(consumer = id, "Fetch failed: {e}");
                    }
                }
            }
        }
    }
}

async fn handle_message(
    id: usize,
    reader: &dyn ClickReader,
    handoff: &mpsc::Sender<String>,
    metrics: &CacheMetrics,
    batches: &mut [Vec<FetchedMessage>],
    config: &ChannelConfig,
    msg: FetchedMessage,
) {
    let partition = msg.partition as usize;

    match handoff.try_send(msg.payload.clone()) {
        Ok(()) => {
            // Only delivered messages become committable: the offset of a
            // dropped message must not be acknowledged ahead of its count.
            batches[partition].push(msg);

            if batches[partition].len() >= config.commit_batch_size {
                commit_partition(id, reader, &mut batches[partition], config).await;
            }
        }
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!(consumer = id, "Aggregation handoff full, dropping click");
            metrics.record_dropped_click();
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!(consumer = id, "Aggregation handoff closed");
        }
    }
}

async fn commit_partition(
    id: usize,
    reader: &dyn ClickReader,
    batch: &mut Vec<FetchedMessage>,
    config: &ChannelConfig,
) {
    if batch.is_empty() {
        return;
    }

    match timeout(config.commit_timeout, reader.commit(batch)).await {
        Ok(Ok(())) => batch.clear(),
        Ok(Err(e)) => warn!(consumer = id, "Offset commit failed: {e}"),
        Err(_) => warn!(consumer = id, "Offset commit timed out"),
    }
}

async fn commit_all(
    id: usize,
    reader: &dyn ClickReader,
    batches: &mut [Vec<FetchedMessage>],
    config: &ChannelConfig,
) {
    for batch in batches.iter_mut() {
        commit_partition(id, reader, batch, config).await;
    }
}

/// Aggregation loop: folds slugs into the pending map and flushes it to
/// the cache counter on threshold or timer.
async fn run_aggregator(
    id: usize,
    mut rx: mpsc::Receiver<String>,
    cache: Arc<dyn CacheStore>,
    config: ChannelConfig,
    cancel: CancellationToken,
) {
    let mut pending: HashMap<String, i64> = HashMap::new();
    let mut flush_tick = interval_at(
        Instant::now() + config.flush_interval,
        config.flush_interval,
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!(consumer = id, "Aggregator stopped");
                return;
            }
            _ = flush_tick.tick() => {
                flush_pending(id, cache.as_ref(), &mut pending).await;
            }
            maybe_slug = rx.recv() => {
                let Some(slug) = maybe_slug else {
                    flush_pending(id, cache.as_ref(), &mut pending).await;
                    return;
                };

                *pending.entry(slug).or_insert(0) += 1;

                if pending.len() >= config.max_pending {
                    flush_pending(id, cache.as_ref(), &mut pending).await;
                }
            }
        }
    }
}

/// Flushes the pending map as one multi-field increment. On failure the
/// map is retained and retried on the next trigger; the increments are
/// commutative, so a later successful flush lands the same totals.
async fn flush_pending(id: usize, cache: &dyn CacheStore, pending: &mut HashMap<String, i64>) {
    if pending.is_empty() {
        return;
    }

    match cache.hash_increment_batch(CLICK_COUNTER_KEY, pending).await {
        Ok(()) => {
            debug!(consumer = id, distinct = pending.len(), "Flushed clicks to cache");
            pending.clear();
        }
        Err(e) => {
            error!(consumer = id, "Failed to cache click counts: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::cache::{MemoryStore, MockCacheStore};
    use crate::infrastructure::channel::{ClickPublisher, InMemoryLog};
    use std::time::Duration;

    fn test_config() -> ChannelConfig {
        ChannelConfig {
            partitions: 2,
            producer_queue_capacity: 1000,
            producer_timeout: Duration::from_millis(200),
            consumer_count: 1,
            handoff_capacity: 1000,
            commit_batch_size: 5,
            commit_interval: Duration::from_millis(50),
            commit_timeout: Duration::from_millis(200),
            flush_interval: Duration::from_millis(50),
            max_pending: 1000,
        }
    }

    #[tokio::test]
    async fn test_consumer_aggregates_into_cache_counter() {
        let log = Arc::new(InMemoryLog::new(2));
        let cache = Arc::new(MemoryStore::new());
        let cancel = CancellationToken::new();

        for i in 0..10u32 {
            log.publish(i % 2, "abc1234").await.unwrap();
        }
        for i in 0..4u32 {
            log.publish(i % 2, "zzz9999").await.unwrap();
        }

        let handle = tokio::spawn(run_consumer(
            0,
            log.clone(),
            cache.clone(),
            Arc::new(CacheMetrics::new()),
            test_config(),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(300)).await;
        cancel.cancel();
        handle.await.unwrap();

        let counts = cache.hash_get_all(CLICK_COUNTER_KEY).await.unwrap();
        assert_eq!(counts.get("abc1234").unwrap(), "10");
        assert_eq!(counts.get("zzz9999").unwrap(), "4");
    }

    #[tokio::test]
    async fn test_offsets_commit_up_to_aggregated_tail() {
        let log = Arc::new(InMemoryLog::new(2));
        let cache = Arc::new(MemoryStore::new());
        let cancel = CancellationToken::new();

        for _ in 0..6 {
            log.publish(0, "abc1234").await.unwrap();
            log.publish(1, "abc1234").await.unwrap();
        }

        let handle = tokio::spawn(run_consumer(
            0,
            log.clone(),
            cache.clone(),
            Arc::new(CacheMetrics::new()),
            test_config(),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(300)).await;
        cancel.cancel();
        handle.await.unwrap();

        // Everything was handed to aggregation, so the drain on shutdown
        // commits every fetched offset.
        assert_eq!(log.committed(0), 6);
        assert_eq!(log.committed(1), 6);
    }

    #[tokio::test]
    async fn test_failed_cache_flush_retains_pending_counts() {
        let log = Arc::new(InMemoryLog::new(2));
        let cancel = CancellationToken::new();

        let mut cache = MockCacheStore::new();
        let mut flushes: usize = 0;
        cache
            .expect_hash_increment_batch()
            .returning(move |_, counts| {
                flushes += 1;
                if flushes == 1 {
                    // First flush fails; the map must be retained and the
                    // full count must arrive with the retry.
                    Err(crate::infrastructure::cache::CacheError::Timeout)
                } else {
                    assert_eq!(*counts.get("abc1234").unwrap(), 3);
                    Ok(())
                }
            });

        log.publish(0, "abc1234").await.unwrap();
        log.publish(0, "abc1234").await.unwrap();
        log.publish(0, "abc1234").await.unwrap();

        let handle = tokio::spawn(run_consumer(
            0,
            log.clone(),
            Arc::new(cache),
            Arc::new(CacheMetrics::new()),
            test_config(),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(300)).await;
        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_full_handoff_drops_instead_of_blocking() {
        let log = Arc::new(InMemoryLog::new(1));
        let cache = Arc::new(MemoryStore::new());
        let metrics = Arc::new(CacheMetrics::new());
        let cancel = CancellationToken::new();

        let mut config = test_config();
        config.partitions = 1;
        config.handoff_capacity = 1;
        // Slow the aggregator down so the handoff saturates.
        config.flush_interval = Duration::from_secs(30);

        let (handoff_tx, _handoff_rx) = mpsc::channel(config.handoff_capacity);

        // Drive the fetch loop directly with a parked receiver: the
        // second message cannot be handed off and must be dropped.
        log.publish(0, "abc1234").await.unwrap();
        log.publish(0, "abc1234").await.unwrap();
        log.publish(0, "abc1234").await.unwrap();

        let fetcher = tokio::spawn(run_fetcher(
            0,
            log.clone() as Arc<dyn ClickReader>,
            handoff_tx,
            metrics.clone(),
            config,
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(150)).await;
        cancel.cancel();
        fetcher.await.unwrap();

        let dropped = metrics.swap().dropped_clicks;
        assert_eq!(dropped, 2);
        // Only the delivered message is committed.
        assert_eq!(log.committed(0), 1);
        let _ = cache;
    }
}
