//! Infrastructure layer - implementations of the domain traits

pub mod auth;
pub mod cache;
pub mod logging;
pub mod revocation;
pub mod session;
pub mod storage;
pub mod token;
pub mod user;
