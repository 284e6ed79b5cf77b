//! Backend selection for the revocation cache

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::cache::Cache;
use crate::domain::clock::Clock;
use crate::domain::DomainError;

use super::in_memory::{InMemoryCache, InMemoryCacheConfig};
use super::redis::{RedisCache, RedisCacheConfig};

/// Cache backends
///
/// `InMemory` only suits a single process: blacklist entries and attempt
/// counters are not shared between instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheType {
    #[default]
    InMemory,
    Redis,
}

impl CacheType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InMemory => "in_memory",
            Self::Redis => "redis",
        }
    }
}

impl fmt::Display for CacheType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in_memory" | "in-memory" | "memory" | "moka" => Ok(Self::InMemory),
            "redis" => Ok(Self::Redis),
            other => Err(DomainError::configuration(format!(
                "Unsupported cache backend '{}', expected in_memory or redis",
                other
            ))),
        }
    }
}

/// Settings for [`CacheFactory::create`]
#[derive(Debug, Clone, Default)]
pub struct CacheConfig {
    pub cache_type: CacheType,
    /// Required for [`CacheType::Redis`]
    pub redis_url: Option<String>,
    /// Namespace for Redis keys shared with other applications
    pub key_prefix: Option<String>,
    /// Entry bound for [`CacheType::InMemory`]
    pub max_capacity: Option<u64>,
}

impl CacheConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn redis(url: impl Into<String>) -> Self {
        Self {
            cache_type: CacheType::Redis,
            redis_url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    pub fn with_max_capacity(mut self, capacity: u64) -> Self {
        self.max_capacity = Some(capacity);
        self
    }
}

/// Builds the configured [`Cache`]
#[derive(Debug, Default)]
pub struct CacheFactory;

impl CacheFactory {
    pub fn new() -> Self {
        Self
    }

    /// The clock governs expiry in the in-memory backend only; Redis
    /// expires keys on its own clock.
    pub async fn create(
        &self,
        config: &CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<dyn Cache>, DomainError> {
        info!("Creating {} cache", config.cache_type);

        let cache: Arc<dyn Cache> = match config.cache_type {
            CacheType::InMemory => {
                let settings = config
                    .max_capacity
                    .map(|capacity| InMemoryCacheConfig::default().with_max_capacity(capacity))
                    .unwrap_or_default();

                Arc::new(InMemoryCache::with_config(settings, clock))
            }
            CacheType::Redis => {
                let url = config.redis_url.as_deref().ok_or_else(|| {
                    DomainError::configuration("A Redis URL is required for the redis cache")
                })?;

                let settings = match &config.key_prefix {
                    Some(prefix) => RedisCacheConfig::new(url).with_key_prefix(prefix.clone()),
                    None => RedisCacheConfig::new(url),
                };

                Arc::new(RedisCache::new(settings).await?)
            }
        };

        Ok(cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cache::CacheExt;
    use crate::domain::clock::SystemClock;
    use std::time::Duration;

    #[test]
    fn test_cache_type_parsing() {
        assert_eq!("in_memory".parse::<CacheType>().unwrap(), CacheType::InMemory);
        assert_eq!(" Memory ".parse::<CacheType>().unwrap(), CacheType::InMemory);
        assert_eq!("moka".parse::<CacheType>().unwrap(), CacheType::InMemory);
        assert_eq!("REDIS".parse::<CacheType>().unwrap(), CacheType::Redis);
        assert!("memcached".parse::<CacheType>().is_err());
    }

    #[test]
    fn test_cache_type_display_matches_serde() {
        for cache_type in [CacheType::InMemory, CacheType::Redis] {
            let json = serde_json::to_string(&cache_type).unwrap();
            assert_eq!(json, format!("\"{}\"", cache_type));
        }
    }

    #[test]
    fn test_redis_config_builder() {
        let config = CacheConfig::redis("redis://localhost:6379").with_key_prefix("inkstack-auth");

        assert_eq!(config.cache_type, CacheType::Redis);
        assert_eq!(config.redis_url.as_deref(), Some("redis://localhost:6379"));
        assert_eq!(config.key_prefix.as_deref(), Some("inkstack-auth"));
    }

    #[tokio::test]
    async fn test_create_in_memory() {
        let config = CacheConfig::in_memory().with_max_capacity(100);
        let cache = CacheFactory::new()
            .create(&config, Arc::new(SystemClock))
            .await
            .unwrap();

        cache
            .set("attempts", &3_i64, Duration::from_secs(60))
            .await
            .unwrap();

        let value: Option<i64> = cache.get("attempts").await.unwrap();
        assert_eq!(value, Some(3));
    }

    #[tokio::test]
    async fn test_create_redis_requires_url() {
        let config = CacheConfig {
            cache_type: CacheType::Redis,
            ..CacheConfig::default()
        };

        let result = CacheFactory::new().create(&config, Arc::new(SystemClock)).await;
        assert!(matches!(result, Err(DomainError::Configuration { .. })));
    }
}
