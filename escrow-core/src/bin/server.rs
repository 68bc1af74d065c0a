//! Escrow server binary
//!
//! Opens the escrow ledger, keeps the global checkpoint current and waits for
//! ctrl-c.

use anyhow::Context;
use escrow_core::{Config, EscrowLedger, SystemClock};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting escrow server");

    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("failed to load config from {}", path))?,
        None => Config::from_env().context("failed to load config from environment")?,
    };
    let clock = Arc::new(SystemClock::new(
        config.clock.genesis_timestamp,
        config.clock.block_time_secs,
    ));
    let block_time = Duration::from_secs(config.clock.block_time_secs.max(1));

    let ledger = EscrowLedger::open(config, clock)
        .await
        .context("failed to open escrow ledger")?;
    tracing::info!(data_dir = ?ledger.config().data_dir, "Escrow ledger opened");

    // Global checkpoint every 300 blocks
    let checkpoints = ledger.handle();
    let ticker = tokio::spawn(async move {
        let mut interval = tokio::time::interval(block_time * 300);
        loop {
            interval.tick().await;
            if let Err(e) = checkpoints.checkpoint().await {
                tracing::error!(error = %e, "Periodic checkpoint failed");
                break;
            }
        }
    });

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down escrow server");
    ticker.abort();
    ledger.shutdown().await?;
    Ok(())
}
