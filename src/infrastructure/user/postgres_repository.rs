//! PostgreSQL user repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::domain::user::{NewUser, Role, User, UserId, UserRepository, UserStatus};
use crate::domain::DomainError;

const USER_COLUMNS: &str = "id, email, username, password_hash, role, is_active, \
     created_at, updated_at, last_login_at, deleted_at";

/// Unique index names created by the schema migration
const EMAIL_UNIQUE_INDEX: &str = "users_email_lower_key";
const USERNAME_UNIQUE_INDEX: &str = "users_username_lower_key";

/// PostgreSQL implementation of UserRepository
#[derive(Debug, Clone)]
pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(
        &self,
        condition: &str,
        value: &str,
        context: &str,
    ) -> Result<Option<User>, DomainError> {
        let sql = format!(
            "SELECT {} FROM users WHERE {} AND deleted_at IS NULL",
            USER_COLUMNS, condition
        );

        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to {}: {}", context, e)))?;

        row.as_ref().map(row_to_user).transpose()
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn create(&self, user: NewUser) -> Result<User, DomainError> {
        let sql = format!(
            r#"
            INSERT INTO users (email, username, password_hash, role, is_active,
                               created_at, updated_at)
            VALUES ($1, $2, $3, $4, TRUE, $5, $5)
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        let row = sqlx::query(&sql)
            .bind(&user.email)
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .bind(user.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_write_error(e, &user.email, &user.username, "create user"))?;

        row_to_user(&row)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, DomainError> {
        let sql = format!(
            "SELECT {} FROM users WHERE id = $1 AND deleted_at IS NULL",
            USER_COLUMNS
        );

        let row = sqlx::query(&sql)
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to get user: {}", e)))?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DomainError> {
        self.find_one("LOWER(email) = LOWER($1)", email, "get user by email")
            .await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, DomainError> {
        self.find_one("LOWER(username) = LOWER($1)", username, "get user by username")
            .await
    }

    async fn find_by_email_or_username(
        &self,
        identifier: &str,
    ) -> Result<Option<User>, DomainError> {
        self.find_one(
            "(LOWER(email) = LOWER($1) OR LOWER(username) = LOWER($1))",
            identifier,
            "get user by identifier",
        )
        .await
    }

    async fn update(&self, user: &User) -> Result<User, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET email = $2, username = $3, password_hash = $4, role = $5,
                is_active = $6, updated_at = $7, last_login_at = $8
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(user.id().value())
        .bind(user.email())
        .bind(user.username())
        .bind(user.password_hash())
        .bind(user.role().as_str())
        .bind(user.is_active())
        .bind(user.updated_at())
        .bind(user.last_login_at())
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, user.email(), user.username(), "update user"))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found(format!(
                "User '{}' not found",
                user.id()
            )));
        }

        Ok(user.clone())
    }

    async fn soft_delete(&self, id: UserId, at: DateTime<Utc>) -> Result<bool, DomainError> {
        let result = sqlx::query(
            "UPDATE users SET deleted_at = $2, updated_at = $2 WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id.value())
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to delete user: {}", e)))?;

        Ok(result.rows_affected() > 0)
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

fn map_write_error(e: sqlx::Error, email: &str, username: &str, context: &str) -> DomainError {
    if let Some(db_err) = e.as_database_error() {
        if db_err.is_unique_violation() {
            return match db_err.constraint() {
                Some(USERNAME_UNIQUE_INDEX) => {
                    DomainError::conflict(format!("Username '{}' already exists", username))
                }
                Some(EMAIL_UNIQUE_INDEX) => {
                    DomainError::conflict(format!("Email '{}' already exists", email))
                }
                _ => DomainError::conflict(format!("User '{}' already exists", username)),
            };
        }
    }

    DomainError::storage(format!("Failed to {}: {}", context, e))
}

fn row_to_user(row: &sqlx::postgres::PgRow) -> Result<User, DomainError> {
    let role: String = row.get("role");
    let is_active: bool = row.get("is_active");

    Ok(User {
        id: UserId::new(row.get("id")),
        email: row.get("email"),
        username: row.get("username"),
        password_hash: row.get("password_hash"),
        role: role
            .parse::<Role>()
            .map_err(|e| DomainError::storage(format!("Invalid role in database: {}", e)))?,
        status: status_from_flag(is_active),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        last_login_at: row.get("last_login_at"),
        deleted_at: row.get("deleted_at"),
    })
}

fn status_from_flag(is_active: bool) -> UserStatus {
    if is_active {
        UserStatus::Active
    } else {
        UserStatus::Inactive
    }
}
