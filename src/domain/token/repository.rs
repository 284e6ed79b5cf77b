//! Refresh token ledger trait

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::fmt::Debug;

use super::refresh_token::{NewRefreshToken, RefreshToken};
use crate::domain::user::UserId;
use crate::domain::DomainError;

/// Authoritative store of refresh token validity
///
/// Time-dependent operations take the caller's `now` so that one request
/// uses a single clock reading throughout.
#[async_trait]
pub trait RefreshTokenRepository: Send + Sync + Debug {
    /// Persist a new token. Fails with `Conflict` if the token string exists.
    async fn store(&self, token: NewRefreshToken) -> Result<RefreshToken, DomainError>;

    /// Look up a token. Fails with `NotFound` if it was never stored.
    async fn find_by_token(&self, token: &str) -> Result<RefreshToken, DomainError>;

    /// Tokens of a user that are not revoked and expire after `now`,
    /// newest first
    async fn find_active_by_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshToken>, DomainError>;

    /// Mark a token revoked. Unknown and already-revoked tokens are not an
    /// error; returns whether a row changed.
    async fn revoke(&self, token: &str, now: DateTime<Utc>) -> Result<bool, DomainError>;

    /// Revoke every active token of a user; returns how many changed
    async fn revoke_all_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<u64, DomainError>;

    /// Hard-delete tokens whose expiry is at or before `now`
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, DomainError>;

    /// Hard-delete tokens revoked more than `older_than` before `now`
    async fn purge_revoked_older_than(
        &self,
        older_than: Duration,
        now: DateTime<Utc>,
    ) -> Result<u64, DomainError>;

    /// Whether the backing store answers
    async fn health_check(&self) -> Result<bool, DomainError>;
}
