//! PostgreSQL refresh token ledger

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row};

use crate::domain::token::{NewRefreshToken, RefreshToken, RefreshTokenRepository};
use crate::domain::user::UserId;
use crate::domain::DomainError;

const TOKEN_COLUMNS: &str = "id, user_id, token, expires_at, is_revoked, revoked_at, \
     ip_address, user_agent, created_at, updated_at, deleted_at";

/// PostgreSQL implementation of RefreshTokenRepository
#[derive(Debug, Clone)]
pub struct PostgresRefreshTokenRepository {
    pool: PgPool,
}

impl PostgresRefreshTokenRepository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshTokenRepository for PostgresRefreshTokenRepository {
    async fn store(&self, token: NewRefreshToken) -> Result<RefreshToken, DomainError> {
        let sql = format!(
            r#"
            INSERT INTO refresh_tokens (user_id, token, expires_at, is_revoked,
                                        ip_address, user_agent, created_at, updated_at)
            VALUES ($1, $2, $3, FALSE, $4, $5, $6, $6)
            RETURNING {}
            "#,
            TOKEN_COLUMNS
        );

        let row = sqlx::query(&sql)
            .bind(token.user_id.value())
            .bind(&token.token)
            .bind(token.expires_at)
            .bind(&token.ip_address)
            .bind(&token.user_agent)
            .bind(token.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e.as_database_error() {
                Some(db_err) if db_err.is_unique_violation() => {
                    DomainError::conflict("Refresh token already exists")
                }
                _ => DomainError::storage(format!("Failed to store refresh token: {}", e)),
            })?;

        Ok(row_to_token(&row))
    }

    async fn find_by_token(&self, token: &str) -> Result<RefreshToken, DomainError> {
        let sql = format!(
            "SELECT {} FROM refresh_tokens WHERE token = $1 AND deleted_at IS NULL",
            TOKEN_COLUMNS
        );

        let row = sqlx::query(&sql)
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to get refresh token: {}", e)))?;

        row.as_ref()
            .map(row_to_token)
            .ok_or_else(|| DomainError::not_found("Refresh token not found"))
    }

    async fn find_active_by_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshToken>, DomainError> {
        let sql = format!(
            r#"
            SELECT {}
            FROM refresh_tokens
            WHERE user_id = $1 AND is_revoked = FALSE AND expires_at > $2
              AND deleted_at IS NULL
            ORDER BY created_at DESC, id DESC
            "#,
            TOKEN_COLUMNS
        );

        let rows = sqlx::query(&sql)
            .bind(user_id.value())
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                DomainError::storage(format!("Failed to list refresh tokens: {}", e))
            })?;

        Ok(rows.iter().map(row_to_token).collect())
    }

    async fn revoke(&self, token: &str, now: DateTime<Utc>) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_revoked = TRUE, revoked_at = $2, updated_at = $2
            WHERE token = $1 AND is_revoked = FALSE
            "#,
        )
        .bind(token)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to revoke refresh token: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    async fn revoke_all_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<u64, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_revoked = TRUE, revoked_at = $2, updated_at = $2
            WHERE user_id = $1 AND is_revoked = FALSE AND expires_at > $2
            "#,
        )
        .bind(user_id.value())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::storage(format!("Failed to revoke refresh tokens: {}", e))
        })?;

        Ok(result.rows_affected())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, DomainError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                DomainError::storage(format!("Failed to purge expired tokens: {}", e))
            })?;

        Ok(result.rows_affected())
    }

    async fn purge_revoked_older_than(
        &self,
        older_than: Duration,
        now: DateTime<Utc>,
    ) -> Result<u64, DomainError> {
        let result = sqlx::query(
            "DELETE FROM refresh_tokens WHERE is_revoked = TRUE AND revoked_at < $1",
        )
        .bind(now - older_than)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to purge revoked tokens: {}", e)))?;

        Ok(result.rows_affected())
    }

    async fn health_check(&self) -> Result<bool, DomainError> {
        let row = sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Health check failed: {}", e)))?;

        let _: i32 = row.get(0);
        Ok(true)
    }
}

fn row_to_token(row: &sqlx::postgres::PgRow) -> RefreshToken {
    RefreshToken {
        id: row.get("id"),
        user_id: UserId::new(row.get("user_id")),
        token: row.get("token"),
        expires_at: row.get("expires_at"),
        is_revoked: row.get("is_revoked"),
        revoked_at: row.get("revoked_at"),
        ip_address: row.get("ip_address"),
        user_agent: row.get("user_agent"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        deleted_at: row.get("deleted_at"),
    }
}
