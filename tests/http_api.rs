//! HTTP surface tests: shorten, redirect, error mapping and the
//! rate-limit middleware, over the in-memory stores.

mod common;

use axum_test::TestServer;
use common::MemoryLinkStore;
use serde_json::{Value, json};
use shortlink::api::routes::app_router;
use shortlink::application::services::LinkService;
use shortlink::infrastructure::cache::MemoryStore;
use shortlink::metrics::CacheMetrics;
use shortlink::ratelimit::InProcessRateLimiter;
use shortlink::state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn test_server(rps: f64, burst: f64) -> TestServer {
    let store = Arc::new(MemoryLinkStore::new());
    let cache = Arc::new(MemoryStore::new());
    let metrics = Arc::new(CacheMetrics::new());
    let (tx, mut rx) = mpsc::channel(1024);

    // Park a drain task so click sends never observe a closed buffer.
    tokio::spawn(async move { while rx.recv().await.is_some() {} });

    let state = AppState {
        links: Arc::new(LinkService::new(
            store,
            cache,
            tx,
            metrics.clone(),
            Duration::from_secs(3600),
        )),
        limiter: Arc::new(InProcessRateLimiter::new(rps, burst)),
        metrics,
        base_url: "http://localhost:3000".to_string(),
    };

    TestServer::new(app_router(state)).unwrap()
}

#[tokio::test]
async fn test_shorten_returns_created_with_slug() {
    let server = test_server(1000.0, 1000.0);

    let response = server
        .post("/shorten")
        .json(&json!({ "long_url": "https://example.com/page" }))
        .await;

    response.assert_status(axum::http::StatusCode::CREATED);

    let body: Value = response.json();
    let slug = body["slug"].as_str().unwrap();
    assert_eq!(slug.len(), 7);
    assert_eq!(
        body["short_url"].as_str().unwrap(),
        format!("http://localhost:3000/{slug}")
    );
}

#[tokio::test]
async fn test_redirect_returns_permanent_redirect() {
    let server = test_server(1000.0, 1000.0);

    let created = server
        .post("/shorten")
        .json(&json!({ "long_url": "https://example.com/page", "custom_slug": "abc1234" }))
        .await;
    created.assert_status(axum::http::StatusCode::CREATED);

    let response = server.get("/abc1234").await;

    response.assert_status(axum::http::StatusCode::PERMANENT_REDIRECT);
    assert_eq!(
        response.header("location").to_str().unwrap(),
        "https://example.com/page"
    );
}

#[tokio::test]
async fn test_unknown_slug_is_404() {
    let server = test_server(1000.0, 1000.0);

    let response = server.get("/zzz9999").await;
    response.assert_status(axum::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_slug_is_404() {
    let server = test_server(1000.0, 1000.0);

    let response = server.get("/bad!!!!").await;
    response.assert_status(axum::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_url_is_400() {
    let server = test_server(1000.0, 1000.0);

    let response = server
        .post("/shorten")
        .json(&json!({ "long_url": "ftp://example.com/file" }))
        .await;

    response.assert_status(axum::http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_duplicate_custom_slug_is_409() {
    let server = test_server(1000.0, 1000.0);

    let first = server
        .post("/shorten")
        .json(&json!({ "long_url": "https://example.com/a", "custom_slug": "taken77" }))
        .await;
    first.assert_status(axum::http::StatusCode::CREATED);

    let second = server
        .post("/shorten")
        .json(&json!({ "long_url": "https://example.com/b", "custom_slug": "taken77" }))
        .await;
    second.assert_status(axum::http::StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_requests_past_burst_are_rate_limited() {
    // Refill is negligible within the test window.
    let server = test_server(0.001, 3.0);

    for _ in 0..3 {
        let response = server.get("/health_miss").await;
        // Burst admits the request; the slug is unknown, so 404.
        response.assert_status(axum::http::StatusCode::NOT_FOUND);
    }

    let response = server.get("/health_miss").await;
    response.assert_status(axum::http::StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_health_is_not_rate_limited() {
    let server = test_server(0.001, 1.0);

    for _ in 0..5 {
        let response = server.get("/health").await;
        response.assert_status(axum::http::StatusCode::OK);
    }
}
