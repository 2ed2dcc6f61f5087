//! Durable store trait for short links.

use crate::domain::entities::ShortLink;
use async_trait::async_trait;
use std::collections::HashMap;

/// Errors from durable-store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The slug is already taken. Surfaced from the uniqueness
    /// constraint, not from a pre-check.
    #[error("slug exists")]
    SlugExists,
    #[error("storage operation timed out")]
    Timeout,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Relational store for [`crate::domain::entities::ShortLink`] rows.
///
/// # Implementations
///
/// - [`crate::infrastructure::persistence::PgLinkStore`] - PostgreSQL
/// - Test mocks via `mockall`, plus an in-memory store in `tests/common`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LinkStore: Send + Sync {
    /// Inserts a new link.
    ///
    /// Insertion is conditional on the slug being free; a conflicting
    /// slug yields [`StoreError::SlugExists`] and leaves the existing row
    /// untouched.
    async fn insert(&self, link: ShortLink) -> StoreResult<()>;

    /// Point lookup of the destination URL for a slug.
    ///
    /// Expired rows are treated as absent even before the cleanup tick
    /// removes them.
    async fn find_long_url(&self, slug: &str) -> StoreResult<Option<String>>;

    /// Applies every `(slug, delta)` pair to `links.clicks` in a single
    /// statement inside one transaction.
    ///
    /// Slugs with no surviving row are skipped silently; their counts
    /// refer to links deleted since the clicks were recorded.
    async fn add_clicks(&self, counts: &HashMap<String, i64>) -> StoreResult<()>;

    /// Deletes rows whose `expires_at` has passed, returning the count.
    async fn delete_expired(&self) -> StoreResult<u64>;

    /// Removes all rows. Test/cleanup use only.
    async fn truncate(&self) -> StoreResult<()>;

    /// Connectivity check, fatal at startup only.
    async fn ping(&self) -> StoreResult<()>;
}
