//! Biosense API Server
//!
//! Run with: cargo run --bin biosense-api
//!
//! # Configuration
//!
//! Read from the first of `~/.config/biosense/config.toml`,
//! `/etc/biosense/config.toml` and `./config.toml`, or from `--config`.
//! `BIOSENSE_*` environment variables override file values and `RUST_LOG`
//! overrides the configured log level.

use anyhow::Context;
use biosense::api::{serve, AppState};
use biosense::config::Config;
use biosense::hub::FanoutHub;
use biosense::monitor::MonitorService;
use biosense::sensor::{SimulatedSourceFactory, SourceFactory};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "biosense-api")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "HRV/EDA monitoring server")]
struct Args {
    /// Config file (default: search the standard locations)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_with_env(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::load_default(),
    };

    biosense::logging::init(&config.logging).context("initializing logging")?;

    tracing::info!("Starting Biosense API server v{}", env!("CARGO_PKG_VERSION"));

    let sources: Option<Arc<dyn SourceFactory>> = if config.simulation.enabled {
        tracing::info!("Simulated sensor sources enabled");
        Some(Arc::new(SimulatedSourceFactory::new(
            config.simulation.source.clone(),
        )))
    } else {
        tracing::info!("Simulation disabled; samples arrive through the ingest endpoint");
        None
    };

    let hub = Arc::new(FanoutHub::new(config.hub.clone()));
    let monitor = Arc::new(MonitorService::new(config.monitor_config(), hub, sources));
    let state = AppState::new(monitor, config.api.clone());

    serve(state, &config.api).await?;

    tracing::info!("Biosense API server stopped");
    Ok(())
}
