//! Revocation/rate-limit infrastructure

mod cache_store;

pub use cache_store::{CacheRevocationStore, DEFAULT_ATTEMPT_WINDOW};
