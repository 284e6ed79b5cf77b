//! Token domain
//!
//! Claims carried inside signed tokens, and the refresh token ledger.

mod claims;
mod refresh_token;
mod repository;

pub use claims::{TokenClaims, TokenKind};
pub use refresh_token::{NewRefreshToken, RefreshToken};
pub use repository::RefreshTokenRepository;
