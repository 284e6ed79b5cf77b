//! Cache key layout for revocation and rate limiting

use sha2::{Digest, Sha256};

/// Namespaces used by the session core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheNamespace {
    Blacklist,
    LoginAttempts,
}

impl CacheNamespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blacklist => "blacklist",
            Self::LoginAttempts => "login_attempts",
        }
    }

    /// Whether `key` was built for this namespace
    pub fn owns(&self, key: &str) -> bool {
        key.strip_prefix(self.as_str())
            .is_some_and(|rest| rest.starts_with(':'))
    }
}

/// Key for a blacklisted access token.
///
/// The token is stored as its SHA-256 digest so bearer credentials never
/// sit in the cache in clear.
pub fn blacklist_key(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    format!("{}:{}", CacheNamespace::Blacklist.as_str(), hex::encode(digest))
}

/// Key for the failed-login counter of an identifier.
///
/// Identifiers are matched case-insensitively at login, so the counter is
/// keyed on the lowercased form.
pub fn login_attempts_key(identifier: &str) -> String {
    format!(
        "{}:{}",
        CacheNamespace::LoginAttempts.as_str(),
        identifier.trim().to_lowercase()
    )
}
