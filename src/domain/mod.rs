//! Domain layer - Core business logic and entities

pub mod cache;
pub mod clock;
pub mod error;
pub mod revocation;
pub mod token;
pub mod user;

pub use cache::{Cache, CacheExt};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::DomainError;
pub use revocation::RevocationStore;
pub use token::{NewRefreshToken, RefreshToken, RefreshTokenRepository, TokenClaims, TokenKind};
pub use user::{NewUser, Role, User, UserId, UserRepository, UserStatus};
