//! Session manager errors

use std::time::Duration;

use thiserror::Error;

use crate::domain::user::{Role, UserValidationError};
use crate::domain::DomainError;
use crate::infrastructure::auth::TokenError;

/// How a transport layer should treat an [`AuthError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Conflict,
    Unauthorized,
    Forbidden,
    RateLimited,
    NotFound,
    Infrastructure,
}

/// Why a refresh token was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshRejection {
    #[error("{0}")]
    Token(TokenError),

    #[error("not present in the ledger")]
    NotFound,

    #[error("revoked")]
    Revoked,

    #[error("past its ledger expiry")]
    Expired,
}

/// Errors returned by the session manager
///
/// Messages for the authentication failures are generic; the precise
/// reason travels on the value for logging.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Validation(#[from] UserValidationError),

    #[error("Email is already registered")]
    DuplicateEmail,

    #[error("Username is already taken")]
    DuplicateUsername,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Current password is incorrect")]
    InvalidCurrentPassword,

    #[error("Too many login attempts, try again in {} minutes", minutes(.retry_after))]
    TooManyAttempts { retry_after: Duration },

    #[error("Account is inactive")]
    AccountInactive,

    #[error("Invalid token")]
    InvalidToken { source: TokenError },

    #[error("Invalid refresh token")]
    InvalidRefreshToken { reason: RefreshRejection },

    #[error("Token has been revoked")]
    TokenRevoked,

    /// A genuine token whose user no longer exists
    #[error("Invalid token")]
    UnknownSubject,

    #[error("Insufficient permissions")]
    InsufficientRole { required: Role },

    #[error("User not found")]
    UserNotFound,

    #[error("Service unavailable: {0}")]
    Infrastructure(#[from] DomainError),
}

fn minutes(duration: &Duration) -> u64 {
    duration.as_secs().div_ceil(60)
}

impl AuthError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) => ErrorCategory::Validation,
            Self::DuplicateEmail | Self::DuplicateUsername => ErrorCategory::Conflict,
            Self::InvalidCredentials
            | Self::InvalidCurrentPassword
            | Self::AccountInactive
            | Self::InvalidToken { .. }
            | Self::InvalidRefreshToken { .. }
            | Self::TokenRevoked
            | Self::UnknownSubject => ErrorCategory::Unauthorized,
            Self::InsufficientRole { .. } => ErrorCategory::Forbidden,
            Self::TooManyAttempts { .. } => ErrorCategory::RateLimited,
            Self::UserNotFound => ErrorCategory::NotFound,
            Self::Infrastructure(_) => ErrorCategory::Infrastructure,
        }
    }

    pub(crate) fn invalid_refresh(reason: RefreshRejection) -> Self {
        Self::InvalidRefreshToken { reason }
    }

    /// Token signing failures are internal faults, not client errors
    pub(crate) fn signing(e: TokenError) -> Self {
        Self::Infrastructure(DomainError::internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::user::{PasswordPolicyError, PasswordViolation};

    #[test]
    fn test_categories() {
        assert_eq!(
            AuthError::Validation(UserValidationError::InvalidEmail).category(),
            ErrorCategory::Validation
        );
        assert_eq!(AuthError::DuplicateEmail.category(), ErrorCategory::Conflict);
        assert_eq!(AuthError::DuplicateUsername.category(), ErrorCategory::Conflict);
        assert_eq!(AuthError::InvalidCredentials.category(), ErrorCategory::Unauthorized);
        assert_eq!(AuthError::TokenRevoked.category(), ErrorCategory::Unauthorized);
        assert_eq!(
            AuthError::invalid_refresh(RefreshRejection::Revoked).category(),
            ErrorCategory::Unauthorized
        );
        assert_eq!(
            AuthError::TooManyAttempts {
                retry_after: Duration::from_secs(900)
            }
            .category(),
            ErrorCategory::RateLimited
        );
        assert_eq!(AuthError::UnknownSubject.category(), ErrorCategory::Unauthorized);
        assert_eq!(
            AuthError::InsufficientRole {
                required: Role::Admin
            }
            .category(),
            ErrorCategory::Forbidden
        );
        assert_eq!(AuthError::UserNotFound.category(), ErrorCategory::NotFound);
        assert_eq!(
            AuthError::from(DomainError::cache("down")).category(),
            ErrorCategory::Infrastructure
        );
        assert_eq!(
            AuthError::signing(TokenError::Signing("bad key".into())).category(),
            ErrorCategory::Infrastructure
        );
    }

    #[test]
    fn test_unauthorized_messages_are_generic() {
        let expired = AuthError::InvalidToken {
            source: TokenError::Expired,
        };
        let bad_sig = AuthError::InvalidToken {
            source: TokenError::InvalidSignature,
        };
        assert_eq!(expired.to_string(), bad_sig.to_string());

        assert_eq!(AuthError::UnknownSubject.to_string(), expired.to_string());

        let not_found = AuthError::invalid_refresh(RefreshRejection::NotFound);
        let revoked = AuthError::invalid_refresh(RefreshRejection::Revoked);
        assert_eq!(not_found.to_string(), revoked.to_string());
    }

    #[test]
    fn test_rate_limit_message_mentions_retry() {
        let err = AuthError::TooManyAttempts {
            retry_after: Duration::from_secs(15 * 60),
        };
        assert_eq!(
            err.to_string(),
            "Too many login attempts, try again in 15 minutes"
        );
    }

    #[test]
    fn test_validation_message_is_specific() {
        let err = AuthError::from(UserValidationError::from(PasswordPolicyError {
            violations: vec![PasswordViolation::MissingDigit],
        }));
        assert!(err.to_string().contains("digit"));
    }
}
