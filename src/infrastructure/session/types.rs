//! Session manager request and response types

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::user::User;

/// Login rate limiting policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Failed attempts per identifier before logins are refused
    pub max_login_attempts: u32,
    /// Length of the counting window, also reported as the retry delay
    pub attempt_window: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_login_attempts: 5,
            attempt_window: Duration::from_secs(15 * 60),
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

impl RegisterRequest {
    pub fn new(
        email: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("email", &self.email)
            .field("username", &self.username)
            .field("password", &"[hidden]")
            .finish()
    }
}

#[derive(Clone, Deserialize)]
pub struct LoginRequest {
    /// Email or username
    pub identifier: String,
    pub password: String,
    pub ip_address: Option<IpAddr>,
    pub user_agent: Option<String>,
}

impl LoginRequest {
    pub fn new(identifier: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            password: password.into(),
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn with_client(mut self, ip_address: IpAddr, user_agent: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address);
        self.user_agent = Some(user_agent.into());
        self
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("identifier", &self.identifier)
            .field("password", &"[hidden]")
            .field("ip_address", &self.ip_address)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// Access and refresh token issued together
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Result of register and login
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticatedSession {
    pub user: User,
    pub tokens: TokenPair,
}

/// Rows removed by a ledger purge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub expired: u64,
    pub revoked: u64,
}

/// Reachability of the stores behind a [`SessionManager`](super::SessionManager)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub credential_store: bool,
    pub token_ledger: bool,
    pub revocation_store: bool,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.credential_store && self.token_ledger && self.revocation_store
    }
}
