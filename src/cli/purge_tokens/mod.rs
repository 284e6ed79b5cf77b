//! Purge command - cleans the refresh token ledger

use clap::Args;
use tracing::info;

#[derive(Debug, Args)]
pub struct PurgeTokensArgs {
    /// Delete revoked tokens whose revocation is older than this many days
    #[arg(long, default_value_t = 30)]
    pub revoked_older_than_days: u32,
}

pub async fn run(args: PurgeTokensArgs) -> anyhow::Result<()> {
    let config = super::load_config()?;
    let manager = crate::create_session_manager(&config).await?;

    let report = manager
        .purge_tokens(chrono::Duration::days(i64::from(args.revoked_older_than_days)))
        .await?;

    info!(
        "Purge complete expired={} revoked={}",
        report.expired, report.revoked
    );
    Ok(())
}
