//! Redis cache/session store adapter.
//!
//! Holds only expendable data, all under a configurable key prefix:
//!
//! - `{prefix}:rl:{ip}:{window}` - rate-limit counters
//! - `{prefix}:revoked:{jti}` - refresh-token blacklist
//! - `{prefix}:cache:categories` - cached category list

use std::time::Duration;

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use secrecy::ExposeSecret;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::time::timeout;

use crate::config::RedisConfig;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const OP_TIMEOUT: Duration = Duration::from_secs(1);

/// Errors from the cache store.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("redis operation timed out")]
    Timeout,
    #[error("cache payload error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Thin wrapper over a Redis `ConnectionManager`.
///
/// Cloning is cheap; all clones share the same multiplexed connection.
#[derive(Clone)]
pub struct CacheStore {
    conn: ConnectionManager,
    prefix: String,
}

impl CacheStore {
    /// Connect and verify the server answers `PING`.
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if the URL is invalid or Redis is unreachable.
    pub async fn connect(config: &RedisConfig) -> Result<Self, CacheError> {
        let client = redis::Client::open(config.url.expose_secret())?;
        let conn = timeout(CONNECT_TIMEOUT, client.get_connection_manager())
            .await
            .map_err(|_| CacheError::Timeout)??;

        let store = Self {
            conn,
            prefix: config.key_prefix.clone(),
        };
        store.ping().await?;
        Ok(store)
    }

    /// Build a namespaced key.
    #[must_use]
    pub fn key(&self, suffix: &str) -> String {
        format!("{}:{suffix}", self.prefix)
    }

    /// # Errors
    ///
    /// Returns `CacheError` if Redis does not answer in time.
    pub async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: String = bounded(redis::cmd("PING").query_async(&mut conn)).await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `CacheError` on Redis failure or timeout.
    pub async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        bounded(conn.get(key)).await
    }

    /// # Errors
    ///
    /// Returns `CacheError` on Redis failure or timeout.
    pub async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        bounded(conn.set_ex(key, value, ttl.as_secs().max(1))).await
    }

    /// `SET key value NX EX ttl`. Returns `false` if the key already existed.
    ///
    /// # Errors
    ///
    /// Returns `CacheError` on Redis failure or timeout.
    pub async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = bounded(
            redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("NX")
                .arg("EX")
                .arg(ttl.as_secs().max(1))
                .query_async(&mut conn),
        )
        .await?;
        Ok(reply.is_some())
    }

    /// Count one hit in a sliding-window pair: increment `current` (re-arming
    /// its expiry) and read `previous` in one round trip. Returns
    /// `(previous, current)`.
    ///
    /// # Errors
    ///
    /// Returns `CacheError` on Redis failure or timeout.
    pub async fn incr_window(
        &self,
        current: &str,
        previous: &str,
        ttl: Duration,
    ) -> Result<(u64, u64), CacheError> {
        let mut conn = self.conn.clone();
        let ttl_secs = i64::try_from(ttl.as_secs().max(1)).unwrap_or(i64::MAX);
        let (count, previous): (u64, Option<u64>) = bounded(
            redis::pipe()
                .atomic()
                .incr(current, 1_u64)
                .expire(current, ttl_secs)
                .ignore()
                .get(previous)
                .query_async(&mut conn),
        )
        .await?;
        Ok((previous.unwrap_or(0), count))
    }

    /// Read a JSON value.
    ///
    /// # Errors
    ///
    /// Returns `CacheError` on Redis failure or a malformed payload.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Write a JSON value with expiry.
    ///
    /// # Errors
    ///
    /// Returns `CacheError` on Redis failure or serialization failure.
    pub async fn set_json<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let raw = serde_json::to_string(value)?;
        self.set_ex(key, &raw, ttl).await
    }
}

async fn bounded<T, F>(fut: F) -> Result<T, CacheError>
where
    F: std::future::Future<Output = Result<T, redis::RedisError>>,
{
    timeout(OP_TIMEOUT, fut)
        .await
        .map_err(|_| CacheError::Timeout)?
        .map_err(CacheError::from)
}
