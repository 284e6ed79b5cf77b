//! Check-config command - validates configuration without side effects

use tracing::info;

pub async fn run() -> anyhow::Result<()> {
    let config = super::load_config()?;
    config.validate()?;

    info!("Configuration is valid: {:?}", config);
    Ok(())
}
