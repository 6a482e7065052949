//! gNMI Get poller for ORCA
//!
//! Polls configuration paths on one gNMI device and logs the responses.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

use orca_gnmi::{ChannelManager, GnmiPollerConfig, LoggingHandler, Poller, RequestDispatcher};

/// Poll a gNMI device with Get requests
#[derive(Parser, Debug)]
#[command(name = "orca-gnmi")]
#[command(about = "Poll gNMI Get requests against a network device")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format)
    #[arg(short, long, default_value = "orca-gnmi.json5")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Override the number of Get calls.
    #[arg(long)]
    ticks: Option<u32>,

    /// Override the delay between calls, in milliseconds.
    #[arg(long)]
    interval_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = GnmiPollerConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?
        .with_poll_overrides(args.ticks, args.interval_ms);
    config.validate()?;

    // Initialize logging
    let logging = config
        .logging
        .clone()
        .with_level_override(args.log_level.as_deref());
    orca_common::init_tracing(&logging)
        .map_err(|e| anyhow::anyhow!("Failed to init tracing: {}", e))?;

    info!(
        address = %config.device.address,
        port = config.device.port,
        paths = config.get.paths.len(),
        "Starting gNMI poller"
    );

    let manager = ChannelManager::from_device(&config.device)
        .context("Failed to open gNMI channel")?;
    let stub = manager
        .stub_for(config.device.credentials.as_ref())
        .context("Failed to attach credentials")?;

    let dispatcher = RequestDispatcher::new(stub, Arc::new(LoggingHandler));
    let poller = Poller::from_config(dispatcher, &config.get, &config.poll)?;

    // Ctrl+C stops the poller between ticks
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signal_task = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    let report = poller.run(shutdown_rx).await;
    signal_task.abort();

    // Stubs go first so closing the manager releases the channel
    drop(poller);
    manager.close();

    info!(
        dispatched = report.dispatched(),
        completed = report.completed(),
        failed = report.failed(),
        "gNMI poller shutdown complete"
    );

    Ok(())
}
