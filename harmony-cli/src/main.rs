use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use harmony_core::auth::Claims;
use harmony_core::clock::Clock;
use harmony_core::config::Config;
use harmony_core::logging::LogConfig;
use harmony_core::{init_logging, Handle, Harmony, LogLevel};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "harmony")]
#[command(author, version, about = "Operator tool for the Harmony identity & membership core", long_about = None)]
struct Args {
    /// Set the log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "warn")]
    log_level: LogLevel,

    /// Enable JSON formatted logging
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or inspect configuration files
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Mint a development bearer token for an account
    Token {
        #[arg(short, long)]
        config: PathBuf,

        /// Account handle, e.g. alice:0042
        #[arg(short, long)]
        account: Handle,

        /// Token lifetime (humantime, e.g. 30m); defaults to auth.token_ttl
        #[arg(long, value_parser = parse_duration)]
        ttl: Option<Duration>,
    },

    /// Replay journaled membership repairs
    Reconcile {
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Write the default configuration
    Init {
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Load and validate a configuration file
    Check { path: PathBuf },
}

fn parse_duration(raw: &str) -> Result<Duration, String> {
    harmony_core::config::parse_duration("ttl", raw).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&LogConfig::new(args.log_level).json_format(args.json_logs))?;

    match args.command {
        Command::Config { action: ConfigAction::Init { path, force } } => init_config(&path, force),
        Command::Config { action: ConfigAction::Check { path } } => check_config(&path),
        Command::Token { config, account, ttl } => mint_token(&config, &account, ttl).await,
        Command::Reconcile { config } => reconcile(&config).await,
    }
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let config = Config::default();
    config.save_to_file(path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn check_config(path: &Path) -> Result<()> {
    let config = Config::from_file(path)?;

    println!("{} is valid", path.display());
    println!("  listen:        {}", config.server.bind_address);
    println!("  store:         {:?} ({})", config.store.backend, config.store.database_path.display());
    println!("  saga deadline: {}ms", config.membership.saga_deadline.as_millis());
    println!("  invite ttl:    {}s", config.membership.invite_ttl.as_secs());
    println!("  log level:     {}", config.logging.level);
    Ok(())
}

fn open(path: &Path) -> Result<Harmony> {
    let config = Config::load(Some(path)).with_context(|| format!("loading {}", path.display()))?;
    Harmony::from_config(config).context("opening store")
}

async fn mint_token(config: &Path, account: &Handle, ttl: Option<Duration>) -> Result<()> {
    let harmony = open(config)?;
    let account = harmony.identity.account_by_handle(account).await?;
    let ttl = ttl.unwrap_or(harmony.config.auth.token_ttl);

    let claims = Claims::for_account(&account, harmony.clock.now(), ttl);
    let token = harmony.verifier.sign(&claims)?;
    info!(account = %account.handle, roles = claims.roles.len(), "Minted token");
    println!("{}", token);
    Ok(())
}

async fn reconcile(config: &Path) -> Result<()> {
    let harmony = open(config)?;
    let report = harmony.registry.reconcile().await?;
    println!("{}", serde_json::to_string(&report)?);
    if report.remaining > 0 {
        bail!("{} repair(s) could not be applied", report.remaining);
    }
    Ok(())
}
