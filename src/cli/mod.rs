//! CLI module for Inkstack Auth
//!
//! Maintenance subcommands:
//! - `migrate`: apply or revert the PostgreSQL schema
//! - `purge-tokens`: delete expired and long-revoked refresh tokens
//! - `check-config`: load and validate configuration
//! - `health`: check that the configured stores answer

pub mod check_config;
pub mod health;
pub mod migrate;
pub mod purge_tokens;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::infrastructure::logging;

/// Inkstack Auth - token-based authentication core
#[derive(Parser)]
#[command(name = "inkstack-auth")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Apply pending database migrations, or revert them
    Migrate(migrate::MigrateArgs),

    /// Delete expired refresh tokens and tokens revoked long ago
    PurgeTokens(purge_tokens::PurgeTokensArgs),

    /// Load and validate configuration, then print it
    CheckConfig,

    /// Check that the credential store, ledger and cache answer
    Health,
}

/// Load `.env` and configuration files, then install logging
pub(crate) fn load_config() -> anyhow::Result<AppConfig> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    logging::init_logging(&config.logging).context("Failed to initialize logging")?;

    Ok(config)
}
