//! devbridge CLI - local development orchestrator
//!
//! This binary runs the bidirectional file sync between a host directory and
//! a container's mounted web root.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use devbridge::logging::init_logging;
use devbridge::{load_config, render_config};
use devbridge_sync::SyncSession;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "devbridge")]
#[command(about = "Local development orchestrator with two-way file sync")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Keep a host directory and a container directory in sync
    Sync {
        /// Host-side directory
        #[arg(long, value_name = "DIR")]
        source: PathBuf,

        /// Container-side directory
        #[arg(long, value_name = "DIR")]
        target: PathBuf,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Sync { source, target }) => {
            run_sync(&source, &target, cli.config.as_deref(), cli.verbose).await
        }
        Some(Commands::Config) => {
            print!("{}", render_config(cli.config.as_deref())?);
            Ok(())
        }
        None => {
            println!("Run 'devbridge sync --source <DIR> --target <DIR>', or --help for more options");
            Ok(())
        }
    }
}

/// Run a sync session until Ctrl-C
async fn run_sync(
    source: &Path,
    target: &Path,
    config_path: Option<&Path>,
    verbose: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    init_logging(&config.logging, verbose)?;

    let mut session = SyncSession::start(source, target, config.sync)
        .await
        .context("Failed to start sync")?;

    info!("Press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    info!("Shutting down");
    session.stop();
    Ok(())
}
