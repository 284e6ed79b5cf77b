//! Inkstack Auth
//!
//! Token-based authentication core:
//! - Argon2id password hashing and strength policy
//! - HS256 access and refresh tokens
//! - Persisted refresh token ledger (in-memory or PostgreSQL)
//! - Access token blacklist and login rate limiting (moka or Redis)
//! - Session lifecycle: register, login, refresh, logout, password change

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use domain::{Cache, Clock, SystemClock};
use infrastructure::{
    auth::{JwtConfig, JwtService},
    cache::{CacheConfig, CacheFactory},
    revocation::CacheRevocationStore,
    session::{SessionConfig, SessionManager},
    storage::{PostgresConfig, Repositories, StorageConfig, StorageFactory, StorageType},
    user::{Argon2Hasher, HashingParams},
};

/// Build a session manager on the system clock
pub async fn create_session_manager(config: &AppConfig) -> anyhow::Result<SessionManager> {
    create_session_manager_with_clock(config, Arc::new(SystemClock)).await
}

/// Build a session manager from configuration with an explicit clock
pub async fn create_session_manager_with_clock(
    config: &AppConfig,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<SessionManager> {
    config.validate()?;

    let repositories = create_repositories(config).await?;
    let cache = create_cache(config, clock.clone()).await?;

    let attempt_window = Duration::from_secs(config.auth.login_attempt_window_secs);
    let revocation = CacheRevocationStore::new(cache).with_attempt_window(attempt_window);

    let hasher = Argon2Hasher::with_params(HashingParams {
        memory_kib: config.password.memory_kib,
        iterations: config.password.iterations,
        parallelism: config.password.parallelism,
    })?;

    let jwt_config = JwtConfig::new(config.auth.jwt_secret.clone())
        .with_issuer(config.auth.issuer.clone())
        .with_access_ttl(seconds(config.auth.access_token_ttl_secs, "access token TTL")?)
        .with_refresh_ttl(seconds(
            config.auth.refresh_token_ttl_secs,
            "refresh token TTL",
        )?);
    let codec = JwtService::new(jwt_config)?;

    info!(
        "Session manager ready storage={:?} cache={}",
        config.database.backend, config.cache.backend
    );

    Ok(SessionManager::new(
        repositories.users,
        repositories.refresh_tokens,
        Arc::new(revocation),
        Arc::new(hasher),
        Arc::new(codec),
        clock,
    )
    .with_config(SessionConfig {
        max_login_attempts: config.auth.max_login_attempts,
        attempt_window,
    }))
}

/// Credential store and ledger for the configured database backend
pub async fn create_repositories(config: &AppConfig) -> anyhow::Result<Repositories> {
    let storage_config = storage_config(config)?;

    StorageFactory::create(&storage_config)
        .await
        .with_context(|| format!("Failed to open {:?} storage", storage_config.storage_type()))
}

/// PostgreSQL settings, or an error when the database backend is not postgres
pub fn postgres_config(config: &AppConfig) -> anyhow::Result<PostgresConfig> {
    if config.database.backend != StorageType::Postgres {
        anyhow::bail!("database.backend must be postgres");
    }

    let url = config
        .database
        .url
        .clone()
        .context("database.url is required for the postgres backend")?;

    Ok(PostgresConfig::new(url)
        .with_max_connections(config.database.max_connections)
        .with_connect_timeout(config.database.connect_timeout_secs))
}

fn storage_config(config: &AppConfig) -> anyhow::Result<StorageConfig> {
    Ok(match config.database.backend {
        StorageType::InMemory => StorageConfig::InMemory,
        StorageType::Postgres => StorageConfig::Postgres(postgres_config(config)?),
    })
}

async fn create_cache(
    config: &AppConfig,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<Arc<dyn Cache>> {
    let cache_config = CacheConfig {
        cache_type: config.cache.backend,
        redis_url: config.cache.redis_url.clone(),
        ..Default::default()
    }
    .with_key_prefix(config.cache.key_prefix.clone())
    .with_max_capacity(config.cache.max_entries);

    Ok(CacheFactory::new().create(&cache_config, clock).await?)
}

fn seconds(secs: u64, name: &str) -> anyhow::Result<chrono::Duration> {
    chrono::Duration::from_std(Duration::from_secs(secs))
        .with_context(|| format!("{} is out of range", name))
}
