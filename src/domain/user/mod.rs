//! User domain
//!
//! This module provides domain types and traits for the credential store,
//! including user entities, input validation, and the repository trait.

mod entity;
mod repository;
mod validation;

pub use entity::{NewUser, Role, User, UserId, UserStatus};
pub use repository::UserRepository;
pub use validation::{
    validate_email, validate_password_strength, validate_username, PasswordPolicyError,
    PasswordViolation, UserValidationError,
};
