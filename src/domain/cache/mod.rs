//! Cache domain - ephemeral key-value storage with per-key expiry

mod key;
mod repository;

pub use key::{blacklist_key, login_attempts_key, CacheNamespace};
pub use repository::{Cache, CacheExt};
