//! Authentication infrastructure module
//!
//! This module provides the JWT token codec used for session tokens.

mod jwt;

pub use jwt::{JwtConfig, JwtService, TokenCodec, TokenError, MIN_SECRET_LEN};
