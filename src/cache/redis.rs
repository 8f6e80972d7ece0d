//! Redis-backed remote tier.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use deadpool_redis::{Pool, Runtime};
use redis::AsyncCommands;
use tracing::{debug, info};

use crate::cache::error::CacheError;
use crate::cache::remote::RemoteStore;
use crate::config::RemoteConfig;

/// [`RemoteStore`] over a pooled Redis connection.
///
/// Every command is bounded by the configured timeout.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
    timeout: Duration,
}

impl RedisStore {
    /// Build a connection pool from `config`. Connections are opened lazily.
    pub fn connect(config: &RemoteConfig) -> Result<Self, CacheError> {
        let timeout = Duration::from_millis(config.timeout_ms);

        let mut redis_config = deadpool_redis::Config::from_url(&config.url);
        let pool_config = redis_config.pool.get_or_insert_with(Default::default);
        pool_config.max_size = config.pool_size;
        pool_config.timeouts.wait = Some(timeout);
        pool_config.timeouts.create = Some(timeout);
        pool_config.timeouts.recycle = Some(timeout);

        let pool = redis_config.create_pool(Some(Runtime::Tokio1))?;
        info!(url = %config.url, pool_size = config.pool_size, "Redis pool created");

        Ok(Self::from_pool(pool, timeout))
    }

    pub fn from_pool(pool: Pool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    async fn bounded<T, F>(&self, op: F) -> Result<T, CacheError>
    where
        F: Future<Output = Result<T, CacheError>>,
    {
        tokio::time::timeout(self.timeout, op)
            .await
            .map_err(|_| CacheError::RemoteTimeout(self.timeout))?
    }

    /// `SET key value [PX ttl] [NX|XX]`; returns whether Redis applied it.
    async fn set_with(
        &self,
        key: &str,
        value: Bytes,
        ttl: Duration,
        condition: Option<&'static str>,
    ) -> Result<bool, CacheError> {
        self.bounded(async {
            let mut cmd = redis::cmd("SET");
            cmd.arg(key).arg(value.as_ref());
            if !ttl.is_zero() {
                cmd.arg("PX").arg(ttl.as_millis().max(1) as u64);
            }
            if let Some(condition) = condition {
                cmd.arg(condition);
            }

            let mut conn = self.pool.get().await?;
            let reply: Option<String> = cmd.query_async(&mut conn).await?;
            Ok::<_, CacheError>(reply.is_some())
        })
        .await
    }
}

#[async_trait]
impl RemoteStore for RedisStore {
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        self.set_with(key, value, ttl, None).await?;
        Ok(())
    }

    async fn set_if_exists(&self, key: &str, value: Bytes, ttl: Duration) -> Result<bool, CacheError> {
        self.set_with(key, value, ttl, Some("XX")).await
    }

    async fn set_if_absent(&self, key: &str, value: Bytes, ttl: Duration) -> Result<bool, CacheError> {
        self.set_with(key, value, ttl, Some("NX")).await
    }

    async fn get(&self, key: &str) -> Result<Bytes, CacheError> {
        self.bounded(async {
            let mut conn = self.pool.get().await?;
            let data: Option<Vec<u8>> = conn.get(key).await?;
            data.map(Bytes::from).ok_or(CacheError::CacheMiss)
        })
        .await
    }

    async fn delete(&self, keys: &[String]) -> Result<(), CacheError> {
        if keys.is_empty() {
            return Ok(());
        }
        self.bounded(async {
            let mut conn = self.pool.get().await?;
            let removed: usize = conn.del(keys).await?;
            debug!(requested = keys.len(), removed, "Redis DEL");
            Ok::<_, CacheError>(())
        })
        .await
    }

    /// Round-trip a PING through the pool.
    async fn ping(&self) -> Result<(), CacheError> {
        self.bounded(async {
            let mut conn = self.pool.get().await?;
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<_, CacheError>(())
        })
        .await
    }
}
