//! In-memory cache implementation using moka

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache as MokaCache;
use moka::Expiry;
use tracing::warn;

use crate::domain::cache::{Cache, CacheNamespace};
use crate::domain::clock::{Clock, SystemClock};
use crate::domain::DomainError;

/// Configuration for in-memory cache
#[derive(Debug, Clone)]
pub struct InMemoryCacheConfig {
    /// Ceiling on live entries. New keys past it are refused, never evicted
    /// in; blacklist keys are always admitted.
    pub max_capacity: u64,
}

impl Default for InMemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 100_000,
        }
    }
}

impl InMemoryCacheConfig {
    /// Creates a new configuration with specified max capacity
    pub fn with_max_capacity(mut self, capacity: u64) -> Self {
        self.max_capacity = capacity;
        self
    }
}

/// Cache entry stored in moka
#[derive(Debug, Clone)]
struct CacheEntry {
    /// Serialized JSON value
    data: String,
    /// Expiration timestamp (millis since epoch, per the cache clock)
    expires_at: i64,
    /// How long moka keeps the entry from this write
    lifetime: Duration,
}

impl CacheEntry {
    fn new(data: String, now_millis: i64, ttl: Duration) -> Self {
        let ttl_millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        Self {
            data,
            expires_at: now_millis.saturating_add(ttl_millis),
            lifetime: ttl,
        }
    }

    fn is_expired_at(&self, now_millis: i64) -> bool {
        now_millis >= self.expires_at
    }

    fn remaining_at(&self, now_millis: i64) -> Duration {
        let remaining = self.expires_at.saturating_sub(now_millis);
        Duration::from_millis(u64::try_from(remaining).unwrap_or(0))
    }
}

/// Drops each entry from moka once its own lifetime has passed
struct EntryExpiry;

impl Expiry<String, CacheEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.lifetime)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.lifetime)
    }
}

/// Thread-safe in-memory cache implementation using moka
///
/// Per-entry expiry is evaluated against the injected [`Clock`], so tests can
/// move time forward without sleeping. Counter increments go through moka's
/// atomic upsert, never a separate read and write.
///
/// Live entries are never evicted for space. Once the capacity is reached,
/// writes that would create a new key fail, except for blacklist keys.
#[derive(Debug)]
pub struct InMemoryCache {
    cache: MokaCache<String, CacheEntry>,
    clock: Arc<dyn Clock>,
    max_capacity: u64,
}

impl InMemoryCache {
    /// Creates a new in-memory cache on the system clock
    pub fn new() -> Self {
        Self::with_config(InMemoryCacheConfig::default(), Arc::new(SystemClock))
    }

    /// Creates a new in-memory cache with the given configuration and clock
    pub fn with_config(config: InMemoryCacheConfig, clock: Arc<dyn Clock>) -> Self {
        let cache = MokaCache::builder().expire_after(EntryExpiry).build();

        Self {
            cache,
            clock,
            max_capacity: config.max_capacity,
        }
    }

    /// Creates a cache with default settings on the given clock
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::with_config(InMemoryCacheConfig::default(), clock)
    }

    fn now_millis(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }

    async fn live_entry(&self, key: &str) -> Option<CacheEntry> {
        let entry = self.cache.get(key).await?;

        if entry.is_expired_at(self.now_millis()) {
            self.cache.remove(key).await;
            return None;
        }

        Some(entry)
    }

    /// Refuses a new key once the cache is full
    fn admit(&self, key: &str) -> Result<(), DomainError> {
        if CacheNamespace::Blacklist.owns(key) || self.cache.contains_key(key) {
            return Ok(());
        }

        if self.cache.entry_count() >= self.max_capacity {
            warn!(
                "In-memory cache full at {} entries, refusing key '{}'",
                self.max_capacity, key
            );
            return Err(DomainError::cache(format!(
                "In-memory cache is full ({} entries)",
                self.max_capacity
            )));
        }

        Ok(())
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, DomainError> {
        Ok(self.live_entry(key).await.map(|entry| entry.data))
    }

    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DomainError> {
        if ttl.is_zero() {
            self.cache.remove(key).await;
            return Ok(());
        }

        self.admit(key)?;
        let entry = CacheEntry::new(value.to_string(), self.now_millis(), ttl);

        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, DomainError> {
        let existed = self.live_entry(key).await.is_some();
        self.cache.remove(key).await;
        Ok(existed)
    }

    async fn exists(&self, key: &str) -> Result<bool, DomainError> {
        Ok(self.live_entry(key).await.is_some())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, DomainError> {
        let now = self.now_millis();

        Ok(self
            .live_entry(key)
            .await
            .map(|entry| entry.remaining_at(now)))
    }

    async fn increment_in_window(
        &self,
        key: &str,
        window: Duration,
    ) -> Result<i64, DomainError> {
        self.admit(key)?;

        let now = self.now_millis();
        let fresh = CacheEntry::new("1".to_string(), now, window);

        let entry = self
            .cache
            .entry(key.to_string())
            .and_upsert_with(|existing| {
                let next = match existing.map(|e| e.into_value()) {
                    Some(current) if !current.is_expired_at(now) => {
                        match current.data.parse::<i64>() {
                            Ok(count) => CacheEntry {
                                data: (count + 1).to_string(),
                                expires_at: current.expires_at,
                                lifetime: current.remaining_at(now),
                            },
                            // Left untouched; reported below
                            Err(_) => current,
                        }
                    }
                    _ => fresh,
                };
                std::future::ready(next)
            })
            .await
            .into_value();

        entry.data.parse::<i64>().map_err(|_| {
            DomainError::cache(format!("Value at key '{}' is not an integer", key))
        })
    }

    async fn health_check(&self) -> Result<bool, DomainError> {
        // Nothing external to reach
        Ok(true)
    }
}
