//! Redis-backed stores.
//!
//! Lets several application instances share duplicate records and challenge
//! counters, so a double submission is caught even when the two requests
//! land on different instances.
//!
//! ## Architecture
//!
//! - Duplicate records: `{prefix}dup:{fingerprint}` created with `SET NX PX`.
//!   The admit is a single atomic command and the record expires natively.
//! - Challenge counters: `{prefix}challenge:{kind}:{user}` incremented by a
//!   Lua script that runs `INCR` and sets `PEXPIRE` when the counter is new,
//!   so the window opens on the first attempt and is never extended.
//!
//! ## Runtime requirements
//!
//! The store ports are synchronous. Inside a tokio runtime calls go through
//! `block_in_place`, which needs the multi-threaded runtime. Outside a
//! runtime a temporary current-thread runtime is built per call.
//!
//! ## Example
//!
//! ```rust,ignore
//! use action_gate::{ActionGate, GateConfig, RedisStorage};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let redis = Arc::new(
//!         RedisStorage::connect("redis://127.0.0.1/")
//!             .await
//!             .expect("Failed to connect to Redis"),
//!     );
//!
//!     let gate = ActionGate::builder(GateConfig::default())
//!         .with_duplicate_store(redis.clone())
//!         .with_challenge_store(redis)
//!         .build()
//!         .unwrap();
//! }
//! ```

use crate::application::ports::{ChallengeStore, DuplicateStore};
use crate::domain::challenge::ChallengeKey;
use crate::domain::fingerprint::Fingerprint;
use crate::error::StoreError;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError, Script};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

const INCREMENT_SCRIPT: &str = r"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return count
";

/// Configuration for Redis storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisStorageConfig {
    /// Key prefix for Redis keys (default: "action-gate:")
    pub key_prefix: String,
}

impl Default for RedisStorageConfig {
    fn default() -> Self {
        Self {
            key_prefix: "action-gate:".to_string(),
        }
    }
}

/// Redis-backed duplicate and challenge store.
#[derive(Clone)]
pub struct RedisStorage {
    connection: Arc<RwLock<ConnectionManager>>,
    config: RedisStorageConfig,
    increment: Script,
}

impl fmt::Debug for RedisStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStorage")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RedisStorage {
    /// Connect to Redis with default configuration.
    ///
    /// # Arguments
    /// * `url` - Redis connection URL (e.g., "redis://127.0.0.1/")
    ///
    /// # Errors
    /// Returns error if connection fails.
    pub async fn connect(url: &str) -> Result<Self, RedisError> {
        Self::connect_with_config(url, RedisStorageConfig::default()).await
    }

    /// Connect to Redis with custom configuration.
    ///
    /// # Errors
    /// Returns error if connection fails.
    pub async fn connect_with_config(
        url: &str,
        config: RedisStorageConfig,
    ) -> Result<Self, RedisError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;

        Ok(Self {
            connection: Arc::new(RwLock::new(connection)),
            config,
            increment: Script::new(INCREMENT_SCRIPT),
        })
    }

    pub fn config(&self) -> &RedisStorageConfig {
        &self.config
    }

    fn duplicate_key(&self, fingerprint: &Fingerprint) -> String {
        format!("{}dup:{}", self.config.key_prefix, fingerprint)
    }

    fn challenge_key(&self, key: &ChallengeKey) -> String {
        format!("{}challenge:{}", self.config.key_prefix, key)
    }

    async fn set_if_absent(&self, key: String, window: Duration) -> Result<bool, RedisError> {
        let mut conn = self.connection.write().await;
        let reply: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(1)
            .arg("NX")
            .arg("PX")
            .arg(millis(window))
            .query_async(&mut *conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: String) -> Result<(), RedisError> {
        let mut conn = self.connection.write().await;
        let _: () = conn.del(&key).await?;
        Ok(())
    }

    async fn counter(&self, key: String) -> Result<u32, RedisError> {
        let mut conn = self.connection.write().await;
        let count: Option<u32> = conn.get(&key).await?;
        Ok(count.unwrap_or(0))
    }

    async fn increment_counter(&self, key: String, window: Duration) -> Result<u32, RedisError> {
        let mut conn = self.connection.write().await;
        let mut invocation = self.increment.key(&key);
        invocation.arg(millis(window));
        let count: u32 = invocation.invoke_async(&mut *conn).await?;
        Ok(count)
    }

    /// Delete every key under this store's prefix.
    ///
    /// # Errors
    /// Returns the first Redis error encountered.
    pub async fn clear(&self) -> Result<(), RedisError> {
        let pattern = format!("{}*", self.config.key_prefix);
        let mut conn = self.connection.write().await;
        let mut cursor = 0u64;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut *conn)
                .await?;

            if !keys.is_empty() {
                let _: () = conn.del(&keys).await?;
            }

            if next == 0 {
                return Ok(());
            }
            cursor = next;
        }
    }
}

/// PX rejects zero, so windows round up to at least one millisecond.
fn millis(window: Duration) -> u64 {
    u64::try_from(window.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Drive a Redis future from a synchronous port method.
fn block_on<T>(fut: impl Future<Output = Result<T, RedisError>>) -> Result<T, StoreError> {
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        tokio::task::block_in_place(|| handle.block_on(fut)).map_err(StoreError::from)
    } else {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| StoreError::Unavailable(format!("failed to create tokio runtime: {e}")))?;
        rt.block_on(fut).map_err(StoreError::from)
    }
}

impl DuplicateStore for RedisStorage {
    fn try_insert(
        &self,
        fingerprint: &Fingerprint,
        _now: Instant,
        window: Duration,
    ) -> Result<bool, StoreError> {
        block_on(self.set_if_absent(self.duplicate_key(fingerprint), window))
    }

    fn remove(&self, fingerprint: &Fingerprint) -> Result<(), StoreError> {
        block_on(self.delete(self.duplicate_key(fingerprint)))
    }
}

impl ChallengeStore for RedisStorage {
    fn attempts(&self, key: &ChallengeKey, _now: Instant) -> Result<u32, StoreError> {
        block_on(self.counter(self.challenge_key(key)))
    }

    fn increment(
        &self,
        key: &ChallengeKey,
        _now: Instant,
        window: Duration,
    ) -> Result<u32, StoreError> {
        block_on(self.increment_counter(self.challenge_key(key), window))
    }

    fn reset(&self, key: &ChallengeKey) -> Result<(), StoreError> {
        block_on(self.delete(self.challenge_key(key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_rounds_up() {
        assert_eq!(millis(Duration::ZERO), 1);
        assert_eq!(millis(Duration::from_micros(500)), 1);
        assert_eq!(millis(Duration::from_secs(2)), 2000);
    }

    #[test]
    fn test_default_prefix() {
        assert_eq!(RedisStorageConfig::default().key_prefix, "action-gate:");
    }
}
