//! Ephemeral token store: string keys, string values, per-key expiry.

use std::time::Duration;

use chrono::Utc;
use moka::future::Cache;
use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;

use super::expiry::{Expiring, WrittenTtl};
use crate::db::errors::DbError;

#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error("token ttl out of range: {0:?}")]
    InvalidTtl(Duration),

    #[error(transparent)]
    Database(#[from] DbError),
}

impl From<sqlx::Error> for TokenStoreError {
    fn from(err: sqlx::Error) -> Self {
        TokenStoreError::Database(err.into())
    }
}

/// Key/value store with expiry, used for single-use password reset tokens.
///
/// An expired key behaves exactly like a missing one.
#[async_trait::async_trait]
pub trait TokenStore: Send + Sync {
    /// Write `value` under `key`, replacing any previous entry and restarting its expiry.
    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<(), TokenStoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, TokenStoreError>;

    /// Remove `key`. Returns whether a live entry was removed.
    async fn delete(&self, key: &str) -> Result<bool, TokenStoreError>;
}

/// In-process [`TokenStore`] backed by a moka cache. Entries do not survive a restart and are
/// not shared between replicas.
///
/// The cache has no size bound; entries leave only through expiry or `delete`, so a successful
/// write is always readable until its ttl runs out.
#[derive(Clone)]
pub struct MemoryTokenStore {
    cache: Cache<String, Expiring<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self {
            cache: Cache::builder().expire_after(WrittenTtl).build(),
        }
    }

    /// Remaining lifetime of a live key.
    pub async fn time_to_live(&self, key: &str) -> Option<Duration> {
        self.cache.get(key).await.and_then(|entry| entry.remaining())
    }
}

impl Default for MemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TokenStore for MemoryTokenStore {
    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<(), TokenStoreError> {
        self.cache.insert(key.to_string(), Expiring::new(value.to_string(), ttl)).await;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, TokenStoreError> {
        Ok(self.cache.get(key).await.map(|entry| entry.value))
    }

    async fn delete(&self, key: &str) -> Result<bool, TokenStoreError> {
        Ok(self.cache.remove(key).await.is_some())
    }
}

/// [`TokenStore`] over the `ephemeral_tokens` table, shared by every replica.
#[derive(Clone)]
pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl TokenStore for PgTokenStore {
    #[instrument(skip(self, key, value), err)]
    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> Result<(), TokenStoreError> {
        let ttl_chrono = chrono::Duration::from_std(ttl).map_err(|_| TokenStoreError::InvalidTtl(ttl))?;
        let expires_at = Utc::now() + ttl_chrono;

        sqlx::query(
            r#"
            INSERT INTO ephemeral_tokens (key, value, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self, key), err)]
    async fn get(&self, key: &str) -> Result<Option<String>, TokenStoreError> {
        // Expired rows are purged lazily, whenever someone looks
        sqlx::query("DELETE FROM ephemeral_tokens WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;

        let value = sqlx::query_scalar::<_, String>("SELECT value FROM ephemeral_tokens WHERE key = $1 AND expires_at > NOW()")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(value)
    }

    #[instrument(skip(self, key), err)]
    async fn delete(&self, key: &str) -> Result<bool, TokenStoreError> {
        let result = sqlx::query("DELETE FROM ephemeral_tokens WHERE key = $1 AND expires_at > NOW()")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
