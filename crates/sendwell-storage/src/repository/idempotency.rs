//! Idempotency key repository

use crate::db::DatabasePool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sendwell_common::{Error, Result};

/// Idempotency repository trait
#[async_trait]
pub trait IdempotencyRepository: Send + Sync {
    /// Insert the key unless it exists. Exactly one concurrent caller per key
    /// gets `true`.
    async fn insert_if_absent(&self, key: &str, seen_at: DateTime<Utc>) -> Result<bool>;

    async fn remove(&self, key: &str) -> Result<()>;

    /// Delete keys first seen before `cutoff`
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// Database idempotency repository
pub struct DbIdempotencyRepository {
    pool: DatabasePool,
}

impl DbIdempotencyRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdempotencyRepository for DbIdempotencyRepository {
    async fn insert_if_absent(&self, key: &str, seen_at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO idempotency_keys (dedup_key, first_seen_at)
            VALUES ($1, $2)
            ON CONFLICT (dedup_key) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(seen_at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM idempotency_keys WHERE dedup_key = $1")
            .bind(key)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM idempotency_keys WHERE first_seen_at < $1")
            .bind(cutoff)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
