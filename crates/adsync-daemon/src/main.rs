//! adsyncd - directory-to-local account synchronization daemon
//!
//! Keeps the members of a local sync group in step with an Azure AD roster:
//! - Creates a local account for every roster principal that lacks one
//! - Deletes sync-group members that left the roster
//! - Re-runs on a timer, on `SIGUSR1`, and stops gracefully on `SIGTERM`
//!
//! The control subcommands (`sync`, `reload`, `stop`) signal the running
//! instance found through its PID file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use adsync_core::config::{Config, ConfigError};

mod logging;
mod pidfile;
mod service;

use pidfile::{DaemonSignal, PidFile};
use service::DaemonService;

#[derive(Debug, Parser)]
#[command(name = "adsyncd", version, about = "Azure AD to local account sync daemon")]
struct Cli {
    /// Configuration file
    #[arg(long, short, global = true, default_value_os_t = Config::default_path())]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the daemon in the foreground
    Run {
        /// Run one reconciliation and exit
        #[arg(long)]
        once: bool,
        /// Print account commands instead of executing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Ask the running daemon to reconcile now
    Sync,
    /// Ask the running daemon to re-read the ignore list
    Reload,
    /// Stop the running daemon after its current tick
    Stop,
    /// Validate the configuration file and exit
    CheckConfig,
}

impl Commands {
    fn control_signal(&self) -> Option<DaemonSignal> {
        match self {
            Commands::Sync => Some(DaemonSignal::Sync),
            Commands::Reload => Some(DaemonSignal::Reload),
            Commands::Stop => Some(DaemonSignal::Stop),
            Commands::Run { .. } | Commands::CheckConfig => None,
        }
    }
}

// ============================================================================
// Subcommands
// ============================================================================

/// Loads and validates the config, printing every problem found
fn check_config(path: &Path) -> Result<()> {
    match Config::load_validated(path) {
        Ok(_) => {
            println!("{}: OK", path.display());
            Ok(())
        }
        Err(ConfigError::Invalid(errors)) => {
            for e in &errors {
                println!("{}: {e}", path.display());
            }
            anyhow::bail!("{} validation error(s)", errors.len())
        }
        Err(e) => Err(e.into()),
    }
}

/// Sends a control signal to the daemon named in the config's PID file
fn control(path: &Path, signal: DaemonSignal) -> Result<()> {
    // The PID file location is all a control command needs
    let config = Config::load(path).context("Failed to load configuration")?;
    let pid = pidfile::signal_daemon(&config.daemon.pid_file, signal)?;
    println!("Sent {signal:?} to adsyncd (pid {pid})");
    Ok(())
}

async fn run(path: &Path, once: bool, dry_run: bool) -> Result<()> {
    let mut config = Config::load_validated(path).context("Failed to load configuration")?;
    if dry_run {
        config.backend.dry_run = true;
    }

    logging::init(&config.logging)?;
    info!(
        config_path = %path.display(),
        version = env!("CARGO_PKG_VERSION"),
        "adsyncd starting"
    );

    let shutdown = CancellationToken::new();
    let service = DaemonService::new(path, config.clone(), shutdown.clone())?;

    // A one-shot run must not race a running daemon either
    let _pid_file = PidFile::acquire(&config.daemon.pid_file)?;

    if once {
        let summary = service.run_once().await?;
        println!("{}", service::summary_json(&summary));
        return Ok(());
    }

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        service::shutdown_signal(signal_token).await;
    });

    let result = service.run().await;
    match &result {
        Ok(()) => info!("adsyncd shut down gracefully"),
        Err(e) => error!(error = %e, "adsyncd exiting with error"),
    }
    result
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(signal) = cli.command.control_signal() {
        return control(&cli.config, signal);
    }

    match cli.command {
        Commands::Run { once, dry_run } => run(&cli.config, once, dry_run).await,
        Commands::CheckConfig => check_config(&cli.config),
        Commands::Sync | Commands::Reload | Commands::Stop => Ok(()),
    }
}
