//! Cache trait definition

use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::domain::DomainError;

/// Ephemeral string store where every key carries its own expiry
///
/// Values are opaque strings so the trait stays object safe; [`CacheExt`]
/// layers JSON encoding on top. Expired keys behave exactly like absent ones.
#[async_trait]
pub trait Cache: Send + Sync + Debug {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, DomainError>;

    /// Store `value` for `ttl`, replacing any previous value and expiry.
    /// A zero `ttl` removes the key.
    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DomainError>;

    /// Returns whether a live key was removed
    async fn delete(&self, key: &str) -> Result<bool, DomainError>;

    async fn exists(&self, key: &str) -> Result<bool, DomainError> {
        Ok(self.get_raw(key).await?.is_some())
    }

    /// Time left before the key expires; `None` when it is absent
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, DomainError>;

    /// Add one to the integer at `key` without a read-modify-write race.
    ///
    /// A missing key starts at 1 and expires `window` later. Increments of
    /// an existing key keep its original expiry.
    async fn increment_in_window(&self, key: &str, window: Duration)
        -> Result<i64, DomainError>;

    /// Whether the backing store answers
    async fn health_check(&self) -> Result<bool, DomainError>;
}

/// JSON-typed access to any [`Cache`]
pub trait CacheExt: Cache {
    fn get<V>(&self, key: &str) -> impl Future<Output = Result<Option<V>, DomainError>> + Send
    where
        V: DeserializeOwned + Send,
    {
        async move {
            self.get_raw(key)
                .await?
                .map(|data| decode(key, &data))
                .transpose()
        }
    }

    fn set<V>(
        &self,
        key: &str,
        value: &V,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), DomainError>> + Send
    where
        V: Serialize + Sync,
    {
        async move {
            let data = serde_json::to_string(value).map_err(|e| {
                DomainError::cache(format!("Cannot encode value for key '{}': {}", key, e))
            })?;
            self.set_raw(key, &data, ttl).await
        }
    }
}

impl<T: Cache + ?Sized> CacheExt for T {}

fn decode<V: DeserializeOwned>(key: &str, data: &str) -> Result<V, DomainError> {
    serde_json::from_str(data)
        .map_err(|e| DomainError::cache(format!("Cannot decode value at key '{}': {}", key, e)))
}
