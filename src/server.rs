//! Startup wiring and runtime lifecycle.
//!
//! Connects the backing stores (fatal on failure), spawns the click
//! pipeline, serves HTTP, and sequences the graceful shutdown: HTTP
//! drains first, then the scheduler, the producer, the consumers, and
//! finally the connections. Each step gets its own bounded timeout; a
//! step that overruns is logged and shutdown proceeds.

use crate::api::routes::app_router;
use crate::application::services::LinkService;
use crate::config::{Config, RateLimitStrategy};
use crate::infrastructure::cache::{CacheStore, RedisStore};
use crate::infrastructure::channel::{ClickReader, InMemoryLog};
use crate::infrastructure::persistence::{LinkStore, PgLinkStore};
use crate::metrics::CacheMetrics;
use crate::ratelimit::{CacheRateLimiter, InProcessRateLimiter, RateLimiter};
use crate::state::AppState;
use crate::workers::{run_consumer, run_producer, run_scheduler};

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_retry::Retry;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Runs the service until a shutdown signal arrives.
///
/// # Errors
///
/// Returns an error if the database or cache cannot be reached at
/// startup, migrations fail, or the listener cannot bind. The same
/// backend failures during steady state are per-call errors, never
/// process aborts.
pub async fn run(config: Config) -> Result<()> {
    let retry = ExponentialBackoff::from_millis(200).map(jitter).take(5);
    let pool = Retry::spawn(retry, || {
        PgPoolOptions::new()
            .max_connections(config.db.max_connections)
            .acquire_timeout(config.db.connect_timeout)
            .idle_timeout(config.db.idle_timeout)
            .max_lifetime(config.db.max_lifetime)
            .connect(&config.db.url)
    })
    .await
    .context("Failed to connect to database")?;
    info!("Connected to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let cache: Arc<dyn CacheStore> = Arc::new(
        RedisStore::connect(
            &config.cache.url,
            config.cache.op_timeout,
            config.cache.url_ttl,
            config.cache.ip_ttl,
        )
        .await
        .context("Failed to connect to Redis")?,
    );

    let store: Arc<dyn LinkStore> =
        Arc::new(PgLinkStore::new(pool.clone(), config.db.op_timeout));
    store
        .ping()
        .await
        .map_err(|e| anyhow::anyhow!("Database ping failed: {e}"))?;

    let metrics = Arc::new(CacheMetrics::new());

    let log = Arc::new(InMemoryLog::new(config.channel.partitions));
    let (click_tx, click_rx) = mpsc::channel(config.channel.producer_queue_capacity);

    let scheduler_token = CancellationToken::new();
    let producer_token = CancellationToken::new();
    let consumer_token = CancellationToken::new();

    let scheduler = tokio::spawn(run_scheduler(
        store.clone(),
        cache.clone(),
        metrics.clone(),
        config.scheduler.clone(),
        scheduler_token.clone(),
    ));

    let producer = tokio::spawn(run_producer(
        click_rx,
        log.clone(),
        config.channel.clone(),
        producer_token.clone(),
    ));

    let consumers: Vec<JoinHandle<()>> = (0..config.channel.consumer_count)
        .map(|id| {
            tokio::spawn(run_consumer(
                id,
                log.clone(),
                cache.clone(),
                metrics.clone(),
                config.channel.clone(),
                consumer_token.clone(),
            ))
        })
        .collect();

    info!(
        consumers = config.channel.consumer_count,
        partitions = config.channel.partitions,
        "Click pipeline started"
    );

    let limiter: Arc<dyn RateLimiter> = match config.rate_limit.strategy {
        RateLimitStrategy::Local => Arc::new(InProcessRateLimiter::new(
            config.rate_limit.rps,
            config.rate_limit.burst,
        )),
        RateLimitStrategy::Cache => Arc::new(CacheRateLimiter::new(
            cache.clone(),
            config.rate_limit.rps,
            config.rate_limit.burst,
        )),
    };

    let links = Arc::new(LinkService::new(
        store,
        cache.clone(),
        click_tx,
        metrics.clone(),
        config.db.url_expiration,
    ));

    let state = AppState {
        links,
        limiter,
        metrics,
        base_url: config.base_url.clone(),
    };

    let app = app_router(state);

    let addr: SocketAddr = config.listen_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // HTTP has drained; stop the pipeline in order. The scheduler goes
    // first so no rotation races the dying consumers, the producer next
    // so its buffer closes, then each consumer drains its pending
    // commits.
    info!("Shutting down");
    let step = config.shutdown_timeout;

    stop_step("scheduler", &scheduler_token, scheduler, step).await;
    stop_step("producer", &producer_token, producer, step).await;

    consumer_token.cancel();
    for (id, handle) in consumers.into_iter().enumerate() {
        if tokio::time::timeout(step, handle).await.is_err() {
            warn!(consumer = id, "Consumer did not stop in time, proceeding");
        }
    }

    log.close().await;
    pool.close().await;
    info!("Shutdown complete");

    Ok(())
}

async fn stop_step(
    name: &str,
    token: &CancellationToken,
    handle: JoinHandle<()>,
    timeout: Duration,
) {
    token.cancel();

    if tokio::time::timeout(timeout, handle).await.is_err() {
        warn!("{name} did not stop in time, proceeding");
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
        return;
    }

    info!("Shutdown signal received");
}
