//! Signed token claims

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::user::{Role, User, UserId};

/// Which half of a token pair a token is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Access => write!(f, "access"),
            Self::Refresh => write!(f, "refresh"),
        }
    }
}

/// Claims carried by both access and refresh tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: the user id, carried as a string
    #[serde(with = "subject")]
    pub sub: UserId,
    pub email: String,
    pub username: String,
    pub role: Role,
    pub typ: TokenKind,
    /// Unique token id
    pub jti: String,
    pub iss: String,
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Not before (Unix seconds)
    pub nbf: i64,
    /// Expiration (Unix seconds)
    pub exp: i64,
}

impl TokenClaims {
    /// Build claims for a user valid from `now` for `ttl`
    pub fn for_user(
        user: &User,
        kind: TokenKind,
        issuer: &str,
        jti: impl Into<String>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        let issued_at = now.timestamp();

        Self {
            sub: user.id(),
            email: user.email().to_string(),
            username: user.username().to_string(),
            role: user.role(),
            typ: kind,
            jti: jti.into(),
            iss: issuer.to_string(),
            iat: issued_at,
            nbf: issued_at,
            exp: (now + ttl).timestamp(),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.sub
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        seconds_to_datetime(self.iat)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        seconds_to_datetime(self.exp)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }

    pub fn is_not_yet_valid_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() < self.nbf
    }

    /// Time left before expiry, `None` once expired
    pub fn remaining_validity(&self, now: DateTime<Utc>) -> Option<Duration> {
        let remaining = self.expires_at() - now;
        (remaining > Duration::zero()).then_some(remaining)
    }
}

/// `sub` is a JSON string per RFC 7519; a non-numeric one fails to decode
mod subject {
    use serde::{de, Deserialize, Deserializer, Serializer};

    use crate::domain::user::UserId;

    pub fn serialize<S: Serializer>(id: &UserId, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(id)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<UserId, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse()
            .map_err(|e| de::Error::custom(format!("subject '{}' is not a user id: {}", raw, e)))
    }
}

fn seconds_to_datetime(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
