//! Optional Redis connection.
//!
//! Counts requests for rate limiting and holds the exchange-rate snapshot
//! shared by every instance. Nothing here is required for correctness:
//! callers decide what a Redis failure means for them.

use redis::{aio::ConnectionManager, AsyncCommands, Client, RedisError};
use serde::{de::DeserializeOwned, Serialize};

use crate::config::CACHE_PREFIX_RATE_LIMIT;
use crate::errors::{AppError, AppResult};

#[derive(Clone)]
pub struct Cache {
    connection: ConnectionManager,
}

impl From<RedisError> for AppError {
    fn from(e: RedisError) -> Self {
        AppError::unavailable(format!("redis: {}", e))
    }
}

impl Cache {
    pub async fn connect(url: &str) -> Result<Self, RedisError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        tracing::info!("Redis cache connected");
        Ok(Self { connection })
    }

    pub async fn ping(&self) -> AppResult<()> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    /// Read a JSON document. A value that no longer parses counts as absent.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> AppResult<Option<T>> {
        let mut conn = self.connection.clone();
        let raw: Option<String> = conn.get(key).await?;
        Ok(raw.and_then(|json| match serde_json::from_str(&json) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "Discarding unreadable cache entry");
                None
            }
        }))
    }

    pub async fn put_json<T: Serialize>(&self, key: &str, value: &T, ttl_seconds: u64) -> AppResult<()> {
        let json = serde_json::to_string(value)?;
        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(key, json, ttl_seconds.max(1)).await?;
        Ok(())
    }

    /// Fixed-window counter: INCR, and start the window on the first hit.
    async fn hit(&self, key: &str, window_seconds: u64) -> AppResult<u64> {
        let mut conn = self.connection.clone();
        let count: u64 = conn.incr(key, 1u64).await?;
        if count == 1 {
            let window = i64::try_from(window_seconds.max(1)).unwrap_or(i64::MAX);
            conn.expire::<_, ()>(key, window).await?;
        }
        Ok(count)
    }

    /// Count one request for `identifier`; returns the count so far in the
    /// current window and whether it is within `max_requests`.
    pub async fn check_rate_limit(
        &self,
        identifier: &str,
        max_requests: u64,
        window_seconds: u64,
    ) -> AppResult<(u64, bool)> {
        let key = format!("{}{}", CACHE_PREFIX_RATE_LIMIT, identifier);
        let count = self.hit(&key, window_seconds).await?;
        Ok((count, count <= max_requests))
    }
}
