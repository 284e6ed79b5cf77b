//! Revocation and login-attempt store backed by a [`Cache`]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::cache::{blacklist_key, login_attempts_key, Cache, CacheExt};
use crate::domain::revocation::RevocationStore;
use crate::domain::DomainError;

/// Default length of the failed-login counting window
pub const DEFAULT_ATTEMPT_WINDOW: Duration = Duration::from_secs(15 * 60);

const BLACKLIST_MARKER: &str = "true";

/// [`RevocationStore`] over any cache backend
///
/// Blacklist entries are keyed by a digest of the token and live exactly as
/// long as the TTL they were given. Attempt counters use the cache's atomic
/// windowed increment.
#[derive(Debug, Clone)]
pub struct CacheRevocationStore {
    cache: Arc<dyn Cache>,
    attempt_window: Duration,
}

impl CacheRevocationStore {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self {
            cache,
            attempt_window: DEFAULT_ATTEMPT_WINDOW,
        }
    }

    /// Sets the failed-login counting window
    pub fn with_attempt_window(mut self, window: Duration) -> Self {
        self.attempt_window = window;
        self
    }
}

#[async_trait]
impl RevocationStore for CacheRevocationStore {
    async fn blacklist(&self, token: &str, ttl: Duration) -> Result<(), DomainError> {
        if ttl.is_zero() {
            return Ok(());
        }

        debug!("Blacklisting access token for {}s", ttl.as_secs());
        self.cache
            .set_raw(&blacklist_key(token), BLACKLIST_MARKER, ttl)
            .await
    }

    async fn is_blacklisted(&self, token: &str) -> Result<bool, DomainError> {
        self.cache.exists(&blacklist_key(token)).await
    }

    async fn increment_attempts(&self, identifier: &str) -> Result<u32, DomainError> {
        let count = self
            .cache
            .increment_in_window(&login_attempts_key(identifier), self.attempt_window)
            .await?;

        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn reset_attempts(&self, identifier: &str) -> Result<(), DomainError> {
        self.cache.delete(&login_attempts_key(identifier)).await?;
        Ok(())
    }

    async fn get_attempts(&self, identifier: &str) -> Result<u32, DomainError> {
        let count: Option<i64> = self.cache.get(&login_attempts_key(identifier)).await?;
        Ok(count
            .map(|c| u32::try_from(c).unwrap_or(u32::MAX))
            .unwrap_or(0))
    }

    async fn health_check(&self) -> Result<bool, DomainError> {
        self.cache.health_check().await
    }
}
