//! Credential store trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;

use super::entity::{NewUser, User, UserId};
use crate::domain::DomainError;

/// Repository trait for user storage
///
/// Email and username comparisons are case-insensitive. Soft-deleted users
/// are invisible to every lookup.
#[async_trait]
pub trait UserRepository: Send + Sync + Debug {
    /// Create a new user, assigning its id.
    /// Fails with `Conflict` when the email or username is already taken.
    async fn create(&self, user: NewUser) -> Result<User, DomainError>;

    /// Get a user by id
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, DomainError>;

    /// Get a user by email
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DomainError>;

    /// Get a user by username
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, DomainError>;

    /// Get a user whose email or username matches the identifier (for login)
    async fn find_by_email_or_username(
        &self,
        identifier: &str,
    ) -> Result<Option<User>, DomainError>;

    /// Persist changes to an existing user
    async fn update(&self, user: &User) -> Result<User, DomainError>;

    /// Soft-delete a user. Returns false if no visible user had that id.
    async fn soft_delete(&self, id: UserId, at: DateTime<Utc>) -> Result<bool, DomainError>;

    /// Whether the backing store answers
    async fn health_check(&self) -> Result<bool, DomainError>;

    /// Check if an email is registered
    async fn email_exists(&self, email: &str) -> Result<bool, DomainError> {
        Ok(self.find_by_email(email).await?.is_some())
    }

    /// Check if a username is taken
    async fn username_exists(&self, username: &str) -> Result<bool, DomainError> {
        Ok(self.find_by_username(username).await?.is_some())
    }
}
