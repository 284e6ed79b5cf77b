//! Redis cache implementation

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError, Script};
use tracing::info;

use crate::domain::cache::Cache;
use crate::domain::DomainError;

/// INCR and, only when the key was just created, PEXPIRE in one round trip
static INCREMENT_IN_WINDOW: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
        local count = redis.call('INCR', KEYS[1])
        if count == 1 then
            redis.call('PEXPIRE', KEYS[1], ARGV[1])
        end
        return count
        "#,
    )
});

/// Connection settings for [`RedisCache`]
#[derive(Debug, Clone)]
pub struct RedisCacheConfig {
    pub url: String,
    /// Prepended to every key as `{prefix}:`
    pub key_prefix: Option<String>,
}

impl RedisCacheConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key_prefix: None,
        }
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }
}

/// [`Cache`] on a shared Redis server
///
/// Keys expire through Redis millisecond TTLs, so every instance pointed
/// at the same server sees the same blacklist and attempt counters.
#[derive(Clone)]
pub struct RedisCache {
    connection: ConnectionManager,
    key_prefix: Option<String>,
}

impl fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCache")
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}

impl RedisCache {
    /// Connect and keep a reconnecting connection manager
    pub async fn new(config: RedisCacheConfig) -> Result<Self, DomainError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| DomainError::cache(format!("Invalid Redis URL: {}", e)))?;

        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| DomainError::cache(format!("Cannot reach Redis: {}", e)))?;

        info!("Connected to Redis key_prefix={:?}", config.key_prefix);
        Ok(Self {
            connection,
            key_prefix: config.key_prefix,
        })
    }

    fn key(&self, key: &str) -> String {
        prefixed(self.key_prefix.as_deref(), key)
    }
}

fn prefixed(prefix: Option<&str>, key: &str) -> String {
    match prefix {
        Some(prefix) => format!("{}:{}", prefix, key),
        None => key.to_string(),
    }
}

/// Whole milliseconds, rounded up so a sub-millisecond TTL never becomes 0
fn millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX)
}

fn failed(operation: &str, key: &str, e: RedisError) -> DomainError {
    DomainError::cache(format!("Redis {} of '{}' failed: {}", operation, key, e))
}

#[async_trait]
impl Cache for RedisCache {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, DomainError> {
        let mut conn = self.connection.clone();
        conn.get(self.key(key))
            .await
            .map_err(|e| failed("GET", key, e))
    }

    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DomainError> {
        if ttl.is_zero() {
            return self.delete(key).await.map(|_| ());
        }

        let mut conn = self.connection.clone();
        conn.pset_ex::<_, _, ()>(self.key(key), value, millis(ttl))
            .await
            .map_err(|e| failed("PSETEX", key, e))
    }

    async fn delete(&self, key: &str) -> Result<bool, DomainError> {
        let mut conn = self.connection.clone();
        let removed: u32 = conn
            .del(self.key(key))
            .await
            .map_err(|e| failed("DEL", key, e))?;

        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, DomainError> {
        let mut conn = self.connection.clone();
        conn.exists(self.key(key))
            .await
            .map_err(|e| failed("EXISTS", key, e))
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, DomainError> {
        let mut conn = self.connection.clone();
        let remaining: i64 = conn
            .pttl(self.key(key))
            .await
            .map_err(|e| failed("PTTL", key, e))?;

        // -2: no such key, -1: key without expiry
        Ok(u64::try_from(remaining).ok().map(Duration::from_millis))
    }

    async fn increment_in_window(
        &self,
        key: &str,
        window: Duration,
    ) -> Result<i64, DomainError> {
        let mut conn = self.connection.clone();
        INCREMENT_IN_WINDOW
            .key(self.key(key))
            .arg(millis(window))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| failed("windowed INCR", key, e))
    }

    async fn health_check(&self) -> Result<bool, DomainError> {
        let mut conn = self.connection.clone();
        let reply: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| DomainError::cache(format!("Health check failed: {}", e)))?;

        Ok(reply == "PONG")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cache::CacheExt;

    #[test]
    fn test_prefixed_key() {
        assert_eq!(
            prefixed(Some("inkstack-auth"), "blacklist:ab"),
            "inkstack-auth:blacklist:ab"
        );
        assert_eq!(prefixed(None, "blacklist:ab"), "blacklist:ab");
    }

    #[test]
    fn test_millis_saturates() {
        assert_eq!(millis(Duration::from_secs(2)), 2000);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_millis_rounds_up_partial_milliseconds() {
        assert_eq!(millis(Duration::from_micros(1)), 1);
        assert_eq!(millis(Duration::from_micros(1500)), 2);
        assert_eq!(millis(Duration::ZERO), 0);
    }

    // Need a Redis server on localhost

    #[tokio::test]
    #[ignore]
    async fn test_redis_set_and_get() {
        let cache = RedisCache::new(RedisCacheConfig::new("redis://127.0.0.1:6379"))
            .await
            .unwrap();

        cache
            .set("test_key", &"test_value", Duration::from_secs(60))
            .await
            .unwrap();

        let result: Option<String> = cache.get("test_key").await.unwrap();
        assert_eq!(result, Some("test_value".to_string()));

        cache.delete("test_key").await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_health_check() {
        let cache = RedisCache::new(RedisCacheConfig::new("redis://127.0.0.1:6379"))
            .await
            .unwrap();

        assert!(cache.health_check().await.unwrap());
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_increment_in_window() {
        let cache = RedisCache::new(
            RedisCacheConfig::new("redis://127.0.0.1:6379").with_key_prefix("test"),
        )
        .await
        .unwrap();
        cache.delete("counter").await.unwrap();

        let window = Duration::from_secs(60);
        assert_eq!(cache.increment_in_window("counter", window).await.unwrap(), 1);
        assert_eq!(cache.increment_in_window("counter", window).await.unwrap(), 2);

        let ttl = cache.ttl("counter").await.unwrap().unwrap();
        assert!(ttl <= window);

        cache.delete("counter").await.unwrap();
    }
}
