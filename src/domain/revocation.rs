//! Revocation and login-attempt store trait

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::error::DomainError;

#[cfg(test)]
use mockall::automock;

/// Short-lived blacklist of access tokens plus per-identifier failed-login
/// counters
///
/// Entries are advisory and expire on their own; losing them only widens
/// the window in which a revoked access token is still honored.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Blacklist an access token for `ttl`. A zero `ttl` is a no-op.
    async fn blacklist(&self, token: &str, ttl: Duration) -> Result<(), DomainError>;

    /// Whether the token is currently blacklisted
    async fn is_blacklisted(&self, token: &str) -> Result<bool, DomainError>;

    /// Record a failed login and return the new count. The counting window
    /// starts on the first failure and is not extended by later ones.
    async fn increment_attempts(&self, identifier: &str) -> Result<u32, DomainError>;

    /// Clear the counter for an identifier
    async fn reset_attempts(&self, identifier: &str) -> Result<(), DomainError>;

    /// Current failure count; zero when absent or expired
    async fn get_attempts(&self, identifier: &str) -> Result<u32, DomainError>;

    /// Whether the backing store answers
    async fn health_check(&self) -> Result<bool, DomainError>;
}
