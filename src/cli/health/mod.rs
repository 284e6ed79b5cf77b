//! Health command - probes the configured stores

use anyhow::bail;
use tracing::{error, info};

pub async fn run() -> anyhow::Result<()> {
    let config = super::load_config()?;
    let manager = crate::create_session_manager(&config).await?;

    let report = manager.health_check().await;
    if !report.is_healthy() {
        error!(
            "Unhealthy credential_store={} token_ledger={} revocation_store={}",
            report.credential_store, report.token_ledger, report.revocation_store
        );
        bail!("One or more stores failed the health check");
    }

    info!("All stores healthy");
    Ok(())
}
