//! User infrastructure module
//!
//! Password hashing with Argon2 and the credential store implementations
//! (in-memory and PostgreSQL).

mod password;
mod postgres_repository;
mod repository;

pub use password::{Argon2Hasher, HashingParams, PasswordHasher};
pub use postgres_repository::PostgresUserRepository;
pub use repository::InMemoryUserRepository;
