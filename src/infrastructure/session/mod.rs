//! Session management - the authentication core
//!
//! [`SessionManager`] ties the credential store, refresh token ledger,
//! revocation store, password hasher and token codec together into the
//! register / login / refresh / logout lifecycle.

mod error;
mod manager;
mod types;

pub use error::{AuthError, ErrorCategory, RefreshRejection};
pub use manager::SessionManager;
pub use types::{
    AuthenticatedSession, HealthReport, LoginRequest, PurgeReport, RegisterRequest,
    SessionConfig, TokenPair,
};
