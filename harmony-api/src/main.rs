use anyhow::{Context, Result};
use clap::Parser;
use harmony_api::{serve, AppState};
use harmony_core::config::Config;
use harmony_core::logging::LogConfig;
use harmony_core::{init_logging, telemetry, Harmony, LogLevel};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;

/// Harmony identity & membership HTTP API
#[derive(Parser, Debug)]
#[command(name = "harmony-api", version, about)]
struct Args {
    /// TOML config file; HARMONY_* variables apply on top
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen address
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<LogLevel>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }
    config.validate().context("validating configuration")?;

    let mut log_config = LogConfig::try_from(&config.logging)?;
    if let Some(level) = args.log_level {
        log_config.level = level;
    }
    init_logging(&log_config.json_format(args.json_logs || config.logging.json_format))?;
    telemetry::describe_metrics();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        backend = ?config.store.backend,
        "Starting Harmony API"
    );

    let harmony = Harmony::from_config(config).context("opening store")?;
    serve(AppState::new(harmony)).await
}
