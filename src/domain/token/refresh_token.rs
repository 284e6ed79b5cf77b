//! Refresh token ledger entry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::user::UserId;

/// Data needed to record a freshly issued refresh token
#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub user_id: UserId,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One persisted refresh token
///
/// Lifecycle: issued -> active -> revoked | expired. A token is usable only
/// while it is not revoked and `now < expires_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshToken {
    pub id: i64,
    pub user_id: UserId,
    #[serde(skip_serializing)]
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub is_revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl RefreshToken {
    pub fn from_new(id: i64, new_token: NewRefreshToken) -> Self {
        Self {
            id,
            user_id: new_token.user_id,
            token: new_token.token,
            expires_at: new_token.expires_at,
            is_revoked: false,
            revoked_at: None,
            ip_address: new_token.ip_address,
            user_agent: new_token.user_agent,
            created_at: new_token.created_at,
            updated_at: new_token.created_at,
            deleted_at: None,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Usable iff not revoked and not past the ledger expiry
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked && !self.is_expired_at(now)
    }

    /// Mark revoked; returns false if it already was
    pub fn revoke(&mut self, at: DateTime<Utc>) -> bool {
        if self.is_revoked {
            return false;
        }

        self.is_revoked = true;
        self.revoked_at = Some(at);
        self.updated_at = at;
        true
    }
}
