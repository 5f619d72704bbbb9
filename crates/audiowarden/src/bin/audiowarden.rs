//! audiowarden - keep the safe output device active and its volume stable
//!
//! Subcommands:
//! - `audiowarden run` - Run the enforcement daemon until Ctrl-C
//! - `audiowarden config` - Show the effective configuration and its sources

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use audiowarden::{
    Collaborators, EnforcementDaemon, FileConfigStore, LogBuffer, Pactl, PactlEvents, SystemClock,
};
use clap::{Parser, Subcommand};
use tracing::info;
use wardenconf::WardenConfig;

#[derive(Parser)]
#[command(name = "audiowarden")]
#[command(about = "Audio endpoint arbitration daemon")]
#[command(version)]
struct Cli {
    /// Config file, replacing ./audiowarden.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the enforcement daemon
    Run {
        /// Exit without running when the device pair is not configured
        #[arg(long)]
        only_if_configured: bool,
    },

    /// Print the effective configuration
    Config {
        /// Emit JSON instead of TOML
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, sources) = WardenConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&config.telemetry.log_level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Commands::Config { json } => {
            if json {
                let report = serde_json::json!({
                    "config": config,
                    "files": sources.files,
                    "env_overrides": sources.env_overrides,
                });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("Failed to render config")?
                );
            } else {
                for file in &sources.files {
                    println!("# from {}", file.display());
                }
                for var in &sources.env_overrides {
                    println!("# env {}", var);
                }
                print!("{}", config.to_toml());
            }
        }
        Commands::Run { only_if_configured } => {
            if only_if_configured && !config.is_configured() {
                info!("device pair not configured, not starting");
                return Ok(());
            }
            run(cli.config, config).await?;
        }
    }

    Ok(())
}

async fn run(config_path: Option<PathBuf>, config: WardenConfig) -> Result<()> {
    info!("audiowarden {} starting", env!("CARGO_PKG_VERSION"));

    let pactl = Arc::new(Pactl::new(&config.pulse));
    let events = Arc::new(PactlEvents::new(pactl.clone()));
    let collaborators = Collaborators {
        config: Arc::new(FileConfigStore::new(config_path)),
        audio: pactl.clone(),
        switcher: pactl,
        endpoint_events: events.clone(),
        volume_events: events,
        clock: Arc::new(SystemClock),
    };
    let log = Arc::new(LogBuffer::new(config.telemetry.log_buffer_bytes));

    let mut daemon = EnforcementDaemon::start(collaborators, config.enforcement, log);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("shutdown requested");

    daemon.stop().await;
    info!("audiowarden shutdown complete");
    Ok(())
}
