//! Redis-backed cache store

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config as DeadpoolConfig, Pool, Runtime};
use serde_json::Value;

use super::CacheStore;
use crate::config::RedisConfig;
use crate::error::{Error, Result};

/// Create a Redis connection pool with retry logic
///
/// Retries `max_retries` times with exponential backoff starting at
/// `retry_delay_secs`.
pub async fn create_pool(config: &RedisConfig) -> Result<Pool> {
    create_pool_with_retries(config, config.max_retries).await
}

async fn create_pool_with_retries(config: &RedisConfig, max_retries: u32) -> Result<Pool> {
    let mut attempt = 0;
    let base_delay = config.retry_delay();

    loop {
        match try_create_pool(config).await {
            Ok(pool) => {
                if attempt > 0 {
                    tracing::info!(
                        "Redis connection established after {} attempt(s)",
                        attempt + 1
                    );
                } else {
                    tracing::info!(
                        "Redis cache pool created: max_connections={}",
                        config.max_connections
                    );
                }
                return Ok(pool);
            }
            Err(e) => {
                attempt += 1;

                if attempt > max_retries {
                    tracing::error!(
                        "Failed to connect to Redis after {} attempts: {}",
                        max_retries + 1,
                        e
                    );
                    return Err(e);
                }

                let delay = backoff(base_delay, attempt);
                tracing::warn!(
                    "Redis connection attempt {} failed: {}. Retrying in {:?}...",
                    attempt,
                    e,
                    delay
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}

fn backoff(base_delay: Duration, attempt: u32) -> Duration {
    base_delay * 2_u32.saturating_pow(attempt.saturating_sub(1))
}

async fn try_create_pool(config: &RedisConfig) -> Result<Pool> {
    let pool = DeadpoolConfig::from_url(&config.url)
        .builder()
        .map_err(|e| Error::Cache(format!("Failed to build Redis pool: {}", e)))?
        .max_size(config.max_connections)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| Error::Cache(format!("Failed to create Redis pool: {}", e)))?;

    let conn = pool
        .get()
        .await
        .map_err(|e| Error::Cache(format!("Failed to get Redis connection: {}", e)))?;
    drop(conn);

    Ok(pool)
}

/// Cache store keeping every named cache in Redis
///
/// Entries live under `{prefix}{name}::{key}`; the keys of each cache are
/// tracked in the set `{prefix}{name}::keys` so a whole cache can be cleared
/// without scanning.
pub struct RedisCacheStore {
    pool: Pool,
    key_prefix: String,
}

impl RedisCacheStore {
    /// Create a store over an existing pool
    pub fn new(pool: Pool) -> Self {
        Self::with_prefix(pool, "acton-crud::")
    }

    /// Create a store with a custom key prefix
    pub fn with_prefix(pool: Pool, prefix: impl Into<String>) -> Self {
        Self {
            pool,
            key_prefix: prefix.into(),
        }
    }

    /// Connect using configuration
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        Ok(Self::new(create_pool(config).await?))
    }

    fn entry_key(&self, name: &str, key: &str) -> String {
        format!("{}{}::{}", self.key_prefix, name, key)
    }

    fn index_key(&self, name: &str) -> String {
        format!("{}{}::keys", self.key_prefix, name)
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| Error::Cache(format!("Failed to get Redis connection: {}", e)))
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, name: &str, key: &str) -> Result<Option<Value>> {
        use deadpool_redis::redis::AsyncCommands;

        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.get(self.entry_key(name, key)).await?;
        raw.map(|json| serde_json::from_str(&json).map_err(Error::from))
            .transpose()
    }

    async fn put(&self, name: &str, key: &str, value: Value) -> Result<()> {
        let json = serde_json::to_string(&value)?;
        let entry = self.entry_key(name, key);

        let mut conn = self.connection().await?;
        deadpool_redis::redis::pipe()
            .atomic()
            .set(&entry, json)
            .ignore()
            .sadd(self.index_key(name), &entry)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn evict(&self, name: &str, key: &str) -> Result<()> {
        let entry = self.entry_key(name, key);

        let mut conn = self.connection().await?;
        deadpool_redis::redis::pipe()
            .atomic()
            .del(&entry)
            .ignore()
            .srem(self.index_key(name), &entry)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn clear(&self, name: &str) -> Result<()> {
        use deadpool_redis::redis::AsyncCommands;

        let index = self.index_key(name);
        let mut conn = self.connection().await?;
        let entries: Vec<String> = conn.smembers(&index).await?;

        let mut pipe = deadpool_redis::redis::pipe();
        pipe.atomic();
        if !entries.is_empty() {
            pipe.del(entries).ignore();
        }
        pipe.del(&index).ignore();
        pipe.query_async::<()>(&mut conn).await?;

        tracing::debug!(cache = name, "Cleared Redis cache");
        Ok(())
    }
}
