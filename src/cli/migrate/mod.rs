//! Migrate command - applies or reverts the PostgreSQL schema

use clap::Args;
use tracing::info;

use crate::infrastructure::storage::{revert_migrations, run_migrations, PostgresMigrator};

#[derive(Debug, Args)]
pub struct MigrateArgs {
    /// Revert every migration newer than this version instead of applying
    #[arg(long, value_name = "VERSION")]
    pub revert_to: Option<i64>,
}

pub async fn run(args: MigrateArgs) -> anyhow::Result<()> {
    let config = super::load_config()?;
    let pool = crate::postgres_config(&config)?.connect().await?;

    match args.revert_to {
        Some(target) => {
            let reverted = revert_migrations(&pool, target).await?;
            info!("Reverted {} migrations down to version={}", reverted, target);
        }
        None => {
            let applied = run_migrations(&pool).await?;
            info!("Applied {} migrations", applied);
        }
    }

    let version = PostgresMigrator::new(pool).current_version().await?;
    info!("Schema at version={}", version.unwrap_or(0));
    Ok(())
}
