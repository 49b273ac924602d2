//! Staking ledger server binary

use anyhow::Context;
use staking_ledger::{spawn_engine_actor, Config, LedgerEngine};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::var("STAKING_LEDGER_CONFIG") {
        Ok(path) => Config::from_file(&path)
            .with_context(|| format!("loading configuration from {}", path))?,
        Err(_) => Config::from_env().context("loading configuration from environment")?,
    };

    // Initialize tracing
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    if config.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        data_dir = %config.data_dir.display(),
        "Starting staking ledger server"
    );

    let engine = Arc::new(LedgerEngine::open(&config).context("opening ledger storage")?);
    let stats = engine.storage().get_stats()?;
    tracing::info!(
        pools = stats.approximate_pools,
        positions = stats.approximate_positions,
        transactions = stats.approximate_transactions,
        "Ledger opened successfully"
    );

    let handle = spawn_engine_actor(engine, config.engine.mailbox_capacity);

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down staking ledger server");
    handle.shutdown().await?;
    Ok(())
}
