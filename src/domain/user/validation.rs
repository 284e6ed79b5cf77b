//! User input validation
//!
//! Email shape, username shape and password strength. Every failed rule is a
//! distinct variant so callers can report the exact reason.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// A single unmet password requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordViolation {
    TooShort { min: usize },
    TooLong { max: usize },
    MissingUppercase,
    MissingLowercase,
    MissingDigit,
    MissingSymbol,
}

impl std::fmt::Display for PasswordViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooShort { min } => write!(f, "must be at least {} characters long", min),
            Self::TooLong { max } => write!(f, "must be at most {} characters long", max),
            Self::MissingUppercase => write!(f, "must contain an uppercase letter"),
            Self::MissingLowercase => write!(f, "must contain a lowercase letter"),
            Self::MissingDigit => write!(f, "must contain a digit"),
            Self::MissingSymbol => write!(f, "must contain a symbol"),
        }
    }
}

/// All password requirements a candidate failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Password {}", describe(.violations))]
pub struct PasswordPolicyError {
    pub violations: Vec<PasswordViolation>,
}

impl PasswordPolicyError {
    pub fn contains(&self, violation: PasswordViolation) -> bool {
        self.violations.contains(&violation)
    }
}

fn describe(violations: &[PasswordViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors that can occur during user validation
#[derive(Debug, Error, Clone, PartialEq)]
pub enum UserValidationError {
    #[error("Email cannot be empty")]
    EmptyEmail,

    #[error("Email exceeds maximum length of {0} characters")]
    EmailTooLong(usize),

    #[error("Email address is not valid")]
    InvalidEmail,

    #[error("Username cannot be empty")]
    EmptyUsername,

    #[error("Username exceeds maximum length of {0} characters")]
    UsernameTooLong(usize),

    #[error("Username is too short. Minimum length is {0} characters")]
    UsernameTooShort(usize),

    #[error("Username contains invalid character: '{0}'. Only alphanumeric characters, underscores, and hyphens are allowed")]
    InvalidUsernameCharacter(char),

    #[error("Username must start with a letter")]
    InvalidUsernameStart,

    #[error(transparent)]
    WeakPassword(#[from] PasswordPolicyError),
}

const MAX_EMAIL_LENGTH: usize = 255;
const MIN_USERNAME_LENGTH: usize = 3;
const MAX_USERNAME_LENGTH: usize = 50;
const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9](?:[A-Za-z0-9\-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9\-]*[A-Za-z0-9])?)*\.[A-Za-z]{2,}$").unwrap()
});

/// Validate an email address
///
/// Rules:
/// - Cannot be empty
/// - Maximum 255 characters
/// - `local@domain.tld` shape
pub fn validate_email(email: &str) -> Result<(), UserValidationError> {
    if email.is_empty() {
        return Err(UserValidationError::EmptyEmail);
    }

    if email.len() > MAX_EMAIL_LENGTH {
        return Err(UserValidationError::EmailTooLong(MAX_EMAIL_LENGTH));
    }

    if !EMAIL_PATTERN.is_match(email) {
        return Err(UserValidationError::InvalidEmail);
    }

    Ok(())
}

/// Validate a username
///
/// Rules:
/// - Cannot be empty
/// - Between 3 and 50 characters
/// - Starts with a letter
/// - Only alphanumeric characters, underscores, and hyphens
pub fn validate_username(username: &str) -> Result<(), UserValidationError> {
    if username.is_empty() {
        return Err(UserValidationError::EmptyUsername);
    }

    if username.len() < MIN_USERNAME_LENGTH {
        return Err(UserValidationError::UsernameTooShort(MIN_USERNAME_LENGTH));
    }

    if username.len() > MAX_USERNAME_LENGTH {
        return Err(UserValidationError::UsernameTooLong(MAX_USERNAME_LENGTH));
    }

    if !username.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return Err(UserValidationError::InvalidUsernameStart);
    }

    for c in username.chars() {
        if !c.is_ascii_alphanumeric() && c != '_' && c != '-' {
            return Err(UserValidationError::InvalidUsernameCharacter(c));
        }
    }

    Ok(())
}

/// Validate password strength
///
/// Collects every unmet requirement instead of stopping at the first one.
pub fn validate_password_strength(password: &str) -> Result<(), PasswordPolicyError> {
    let mut violations = Vec::new();
    let length = password.chars().count();

    if length < MIN_PASSWORD_LENGTH {
        violations.push(PasswordViolation::TooShort {
            min: MIN_PASSWORD_LENGTH,
        });
    }

    if length > MAX_PASSWORD_LENGTH {
        violations.push(PasswordViolation::TooLong {
            max: MAX_PASSWORD_LENGTH,
        });
    }

    if !password.chars().any(char::is_uppercase) {
        violations.push(PasswordViolation::MissingUppercase);
    }

    if !password.chars().any(char::is_lowercase) {
        violations.push(PasswordViolation::MissingLowercase);
    }

    if !password.chars().any(|c| c.is_ascii_digit()) {
        violations.push(PasswordViolation::MissingDigit);
    }

    if !password
        .chars()
        .any(|c| !c.is_alphanumeric() && !c.is_whitespace())
    {
        violations.push(PasswordViolation::MissingSymbol);
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(PasswordPolicyError { violations })
    }
}
