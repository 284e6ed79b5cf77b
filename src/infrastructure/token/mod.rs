//! Refresh token ledger implementations (in-memory and PostgreSQL)

mod postgres_repository;
mod repository;

pub use postgres_repository::PostgresRefreshTokenRepository;
pub use repository::InMemoryRefreshTokenRepository;
