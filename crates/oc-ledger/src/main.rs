//! Ledger host entry point.

use anyhow::Result;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use oc_ledger::{LedgerConfig, LedgerNode};

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = LedgerConfig::from_env();
    info!(
        read_port = config.read_port,
        write_port = config.write_port,
        "starting ledger host"
    );

    let node = LedgerNode::start(config).await?;
    wait_for_shutdown_signal().await?;

    info!("shutdown signal received");
    node.shutdown().await;
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }
    Ok(())
}
