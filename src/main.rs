//! # Dialer Main Entry Point

use std::sync::Arc;

use anyhow::Context;
use dialer::{config::ConfigLoader, dialer::Dialer, server::run_server, telemetry};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from layered env files and variables
    let config = ConfigLoader::new()
        .load()
        .context("failed to load configuration")?;

    telemetry::init_tracing(&config).context("failed to initialize telemetry")?;

    info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!(config = %redacted_json, "Effective configuration");
    }

    let dialer = Arc::new(Dialer::from_config(&config).context("failed to build dialer")?);

    run_server(config, dialer)
        .await
        .map_err(|err| anyhow::anyhow!("server error: {err}"))
}
