//! In-memory user repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::user::{NewUser, User, UserId, UserRepository};
use crate::domain::DomainError;

/// In-memory implementation of UserRepository
///
/// Ids are assigned sequentially starting at 1. Uniqueness of email and
/// username is enforced case-insensitively among users that are not
/// soft-deleted.
#[derive(Debug)]
pub struct InMemoryUserRepository {
    users: Arc<RwLock<HashMap<UserId, User>>>,
    next_id: AtomicI64,
}

impl InMemoryUserRepository {
    /// Create a new empty repository
    pub fn new() -> Self {
        Self {
            users: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicI64::new(1),
        }
    }
}

impl Default for InMemoryUserRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn same(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

fn visible(user: &&User) -> bool {
    !user.is_deleted()
}

fn check_unique(
    users: &HashMap<UserId, User>,
    email: &str,
    username: &str,
    except: Option<UserId>,
) -> Result<(), DomainError> {
    for other in users.values().filter(visible) {
        if Some(other.id()) == except {
            continue;
        }
        if same(other.email(), email) {
            return Err(DomainError::conflict(format!(
                "Email '{}' already exists",
                email
            )));
        }
        if same(other.username(), username) {
            return Err(DomainError::conflict(format!(
                "Username '{}' already exists",
                username
            )));
        }
    }
    Ok(())
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: NewUser) -> Result<User, DomainError> {
        let mut users = self.users.write().await;

        check_unique(&users, &user.email, &user.username, None)?;

        let id = UserId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let user = User::from_new(id, user);
        users.insert(id, user.clone());

        Ok(user)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, DomainError> {
        let users = self.users.read().await;
        Ok(users.get(&id).filter(visible).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DomainError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .filter(visible)
            .find(|u| same(u.email(), email))
            .cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, DomainError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .filter(visible)
            .find(|u| same(u.username(), username))
            .cloned())
    }

    async fn find_by_email_or_username(
        &self,
        identifier: &str,
    ) -> Result<Option<User>, DomainError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .filter(visible)
            .find(|u| same(u.email(), identifier) || same(u.username(), identifier))
            .cloned())
    }

    async fn update(&self, user: &User) -> Result<User, DomainError> {
        let mut users = self.users.write().await;

        match users.get(&user.id()) {
            Some(existing) if !existing.is_deleted() => {}
            _ => {
                return Err(DomainError::not_found(format!(
                    "User '{}' not found",
                    user.id()
                )))
            }
        }

        check_unique(&users, user.email(), user.username(), Some(user.id()))?;

        users.insert(user.id(), user.clone());
        Ok(user.clone())
    }

    async fn soft_delete(&self, id: UserId, at: DateTime<Utc>) -> Result<bool, DomainError> {
        let mut users = self.users.write().await;

        match users.get_mut(&id) {
            Some(user) if !user.is_deleted() => {
                user.mark_deleted(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn health_check(&self) -> Result<bool, DomainError> {
        // In-memory store is always healthy
        Ok(true)
    }
}
