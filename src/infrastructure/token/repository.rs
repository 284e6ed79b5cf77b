//! In-memory refresh token ledger

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::token::{NewRefreshToken, RefreshToken, RefreshTokenRepository};
use crate::domain::user::UserId;
use crate::domain::DomainError;

#[derive(Debug, Default)]
struct Ledger {
    tokens: HashMap<String, RefreshToken>,
    next_id: i64,
}

/// In-memory implementation of RefreshTokenRepository
///
/// All mutations happen under one write lock, so revocation and lookup of
/// the same token never interleave.
#[derive(Debug, Default)]
pub struct InMemoryRefreshTokenRepository {
    ledger: Arc<RwLock<Ledger>>,
}

impl InMemoryRefreshTokenRepository {
    /// Create a new empty ledger
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RefreshTokenRepository for InMemoryRefreshTokenRepository {
    async fn store(&self, token: NewRefreshToken) -> Result<RefreshToken, DomainError> {
        let mut ledger = self.ledger.write().await;

        if ledger.tokens.contains_key(&token.token) {
            return Err(DomainError::conflict("Refresh token already exists"));
        }

        ledger.next_id += 1;
        let record = RefreshToken::from_new(ledger.next_id, token);
        ledger.tokens.insert(record.token.clone(), record.clone());

        Ok(record)
    }

    async fn find_by_token(&self, token: &str) -> Result<RefreshToken, DomainError> {
        let ledger = self.ledger.read().await;

        ledger
            .tokens
            .get(token)
            .filter(|t| t.deleted_at.is_none())
            .cloned()
            .ok_or_else(|| DomainError::not_found("Refresh token not found"))
    }

    async fn find_active_by_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshToken>, DomainError> {
        let ledger = self.ledger.read().await;

        let mut active: Vec<RefreshToken> = ledger
            .tokens
            .values()
            .filter(|t| t.user_id == user_id && t.deleted_at.is_none() && t.is_usable_at(now))
            .cloned()
            .collect();

        active.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(active)
    }

    async fn revoke(&self, token: &str, now: DateTime<Utc>) -> Result<bool, DomainError> {
        let mut ledger = self.ledger.write().await;

        Ok(ledger
            .tokens
            .get_mut(token)
            .map(|record| record.revoke(now))
            .unwrap_or(false))
    }

    async fn revoke_all_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<u64, DomainError> {
        let mut ledger = self.ledger.write().await;

        let revoked = ledger
            .tokens
            .values_mut()
            .filter(|t| t.user_id == user_id && t.is_usable_at(now))
            .map(|t| t.revoke(now))
            .filter(|changed| *changed)
            .count();

        Ok(revoked as u64)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, DomainError> {
        let mut ledger = self.ledger.write().await;

        let before = ledger.tokens.len();
        ledger.tokens.retain(|_, t| !t.is_expired_at(now));

        Ok((before - ledger.tokens.len()) as u64)
    }

    async fn purge_revoked_older_than(
        &self,
        older_than: Duration,
        now: DateTime<Utc>,
    ) -> Result<u64, DomainError> {
        let mut ledger = self.ledger.write().await;
        let cutoff = now - older_than;

        let before = ledger.tokens.len();
        ledger
            .tokens
            .retain(|_, t| !matches!(t.revoked_at, Some(at) if t.is_revoked && at < cutoff));

        Ok((before - ledger.tokens.len()) as u64)
    }

    async fn health_check(&self) -> Result<bool, DomainError> {
        // In-memory store is always healthy
        Ok(true)
    }
}
