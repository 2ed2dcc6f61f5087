//! PostgreSQL implementation of the link store.

use super::link_store::{LinkStore, StoreError, StoreResult};
use crate::domain::entities::ShortLink;
use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use std::time::Duration;

/// PostgreSQL link store.
///
/// Queries are runtime-bound prepared statements. Every call is bounded
/// by the configured per-call deadline; an exceeded deadline surfaces as
/// [`StoreError::Timeout`].
pub struct PgLinkStore {
    pool: PgPool,
    op_timeout: Duration,
}

impl PgLinkStore {
    pub fn new(pool: PgPool, op_timeout: Duration) -> Self {
        Self { pool, op_timeout }
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, sqlx::Error>>,
    ) -> StoreResult<T> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(StoreError::Database(e)),
            Err(_) => Err(StoreError::Timeout),
        }
    }
}

/// Builds the bulk click-increment statement:
/// `UPDATE links SET clicks = clicks + delta FROM (VALUES ...)`.
///
/// One placeholder pair per slug; the whole batch lands in a single
/// statement so the increment is atomic per rotation.
fn build_clicks_query(len: usize) -> String {
    let mut query =
        String::from("UPDATE links SET clicks = links.clicks + data.added FROM (VALUES ");

    for i in 0..len {
        if i > 0 {
            query.push(',');
        }
        query.push_str(&format!("(${}, ${}::bigint)", i * 2 + 1, i * 2 + 2));
    }

    query.push_str(") AS data(slug, added) WHERE links.slug = data.slug");
    query
}

#[async_trait]
impl LinkStore for PgLinkStore {
    async fn insert(&self, link: ShortLink) -> StoreResult<()> {
        let result = self
            .bounded(
                sqlx::query(
                    r#"
                    INSERT INTO links (slug, long_url, created_at, expires_at)
                    VALUES ($1, $2, $3, $4)
                    ON CONFLICT (slug) DO NOTHING
                    "#,
                )
                .bind(&link.slug)
                .bind(&link.long_url)
                .bind(link.created_at)
                .bind(link.expires_at)
                .execute(&self.pool),
            )
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::SlugExists);
        }

        Ok(())
    }

    async fn find_long_url(&self, slug: &str) -> StoreResult<Option<String>> {
        self.bounded(
            sqlx::query_scalar::<_, String>(
                "SELECT long_url FROM links WHERE slug = $1 AND expires_at > NOW()",
            )
            .bind(slug)
            .fetch_optional(&self.pool),
        )
        .await
    }

    async fn add_clicks(&self, counts: &HashMap<String, i64>) -> StoreResult<()> {
        if counts.is_empty() {
            return Ok(());
        }

        let sql = build_clicks_query(counts.len());
        let mut query = sqlx::query(&sql);
        for (slug, delta) in counts {
            query = query.bind(slug).bind(delta);
        }

        let pool = &self.pool;
        self.bounded(async move {
            let mut tx = pool.begin().await?;
            query.execute(&mut *tx).await?;
            tx.commit().await
        })
        .await
    }

    async fn delete_expired(&self) -> StoreResult<u64> {
        let result = self
            .bounded(
                sqlx::query("DELETE FROM links WHERE expires_at < NOW()").execute(&self.pool),
            )
            .await?;

        Ok(result.rows_affected())
    }

    async fn truncate(&self) -> StoreResult<()> {
        self.bounded(
            sqlx::query("TRUNCATE TABLE links RESTART IDENTITY").execute(&self.pool),
        )
        .await?;

        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        self.bounded(sqlx::query("SELECT 1").execute(&self.pool))
            .await?;

        Ok(())
    }
}
