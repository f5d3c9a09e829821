//! Daemon service - wires the adapters together and drives the tick loop

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use adsync_accounts::{
    CommandRunner, DirectoryAccountBackend, DryRunCommandRunner, LinuxAccountBackend,
    SystemCommandRunner,
};
use adsync_core::config::{BackendKind, Config};
use adsync_core::ports::{IAccountBackend, IDirectorySource};
use adsync_graph::directory::GraphDirectorySource;
use adsync_sync::engine::{EngineSettings, ReconcileSummary, ReconciliationEngine};
use adsync_sync::handler::SyncHandler;
use adsync_sync::hooks::PostCreateHook;
use adsync_sync::scheduler::TickScheduler;

// ============================================================================
// Composition
// ============================================================================

/// Builds the account backend selected by `backend.kind`
///
/// In dry-run mode mutating commands are printed instead of executed.
pub fn build_backend(config: &Config) -> Arc<dyn IAccountBackend> {
    let runner: Arc<dyn CommandRunner> = if config.backend.dry_run {
        Arc::new(DryRunCommandRunner::new(SystemCommandRunner))
    } else {
        Arc::new(SystemCommandRunner)
    };

    match config.backend.kind {
        BackendKind::Linux => Arc::new(LinuxAccountBackend::new(
            config.backend.files.clone(),
            runner,
        )),
        BackendKind::Directory => Arc::new(DirectoryAccountBackend::new(runner)),
    }
}

/// Builds the reconciliation engine for `config`
///
/// The post-create hook is left out in dry-run mode since no account is
/// actually created.
pub fn build_engine(config: &Config) -> Result<ReconciliationEngine> {
    let directory: Arc<dyn IDirectorySource> = Arc::new(
        GraphDirectorySource::from_config(&config.directory)
            .context("Failed to set up the directory source")?,
    );
    let backend = build_backend(config);
    let engine = ReconciliationEngine::new(
        directory,
        backend,
        EngineSettings::from_config(&config.backend),
    );

    let hook = config
        .hooks
        .post_create
        .as_deref()
        .and_then(PostCreateHook::from_argv);
    Ok(match hook {
        Some(hook) if !config.backend.dry_run => {
            info!(hook = hook.program(), "Post-create hook enabled");
            engine.with_hook(hook)
        }
        _ => engine,
    })
}

/// JSON rendering of a tick summary for `run --once`
pub fn summary_json(summary: &ReconcileSummary) -> serde_json::Value {
    let failures: Vec<serde_json::Value> = summary
        .failures
        .iter()
        .map(|f| {
            serde_json::json!({
                "principal": f.principal,
                "operation": f.operation.to_string(),
                "error": f.error,
            })
        })
        .collect();

    serde_json::json!({
        "tick_id": summary.tick_id.to_string(),
        "created": summary.created,
        "deleted": summary.deleted,
        "skipped_ignored": summary.skipped_ignored,
        "group_created": summary.group_created,
        "failures": failures,
        "duration_ms": summary.duration_ms,
    })
}

// ============================================================================
// DaemonService
// ============================================================================

/// Long-running daemon state
pub struct DaemonService {
    config_path: PathBuf,
    config: Config,
    handler: SyncHandler,
    shutdown: CancellationToken,
}

impl DaemonService {
    pub fn new(config_path: &Path, config: Config, shutdown: CancellationToken) -> Result<Self> {
        let handler = SyncHandler::new(build_engine(&config)?);
        Ok(Self {
            config_path: config_path.to_path_buf(),
            config,
            handler,
            shutdown,
        })
    }

    /// Runs a single tick
    pub async fn run_once(&self) -> Result<ReconcileSummary> {
        self.handler
            .reconcile()
            .await
            .context("Reconciliation aborted")
    }

    /// Runs ticks until shutdown
    ///
    /// `SIGUSR1` requests an immediate tick, `SIGUSR2` reloads the ignore
    /// list, `SIGTERM`/`SIGINT` stop the loop once the current tick is done.
    pub async fn run(&self) -> Result<()> {
        let period = Duration::from_secs(self.config.sync.interval_secs);
        let mut scheduler = TickScheduler::new(period, self.shutdown.clone());

        let mut usr1 = signal(SignalKind::user_defined1()).context("Failed to install SIGUSR1 handler")?;
        let mut usr2 = signal(SignalKind::user_defined2()).context("Failed to install SIGUSR2 handler")?;

        let requester = scheduler.requester();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = usr1.recv() => {
                        info!("Received SIGUSR1");
                        requester.request_sync();
                    }
                    _ = shutdown.cancelled() => break,
                }
            }
        });

        let handler = self.handler.clone();
        let config_path = self.config_path.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = usr2.recv() => {
                        info!("Received SIGUSR2");
                        reload_ignore_list(&config_path, &handler).await;
                    }
                    _ = shutdown.cancelled() => break,
                }
            }
        });

        info!(
            interval_secs = scheduler.period().as_secs(),
            sync_group = %self.config.backend.sync_group,
            backend = %self.config.backend.kind,
            dry_run = self.config.backend.dry_run,
            "Entering sync loop"
        );

        while let Some(reason) = scheduler.next_tick().await {
            info!(reason = ?reason, "Tick");
            // Runs to completion; shutdown is only observed by next_tick
            if let Err(e) = self.handler.reconcile().await {
                error!(error = %e, "Tick aborted");
            }
        }

        info!("Sync loop terminated");
        Ok(())
    }
}

/// Re-reads the config file and applies its ignore list
///
/// Any other config change needs a restart. A config that fails to load or
/// validate leaves the current ignore list in place.
pub async fn reload_ignore_list(config_path: &Path, handler: &SyncHandler) {
    match Config::load_validated(config_path) {
        Ok(config) => {
            handler.set_ignore_list(config.directory.ignore_list()).await;
            info!(path = %config_path.display(), "Configuration reloaded");
        }
        Err(e) => {
            warn!(path = %config_path.display(), error = %e, "Reload failed, keeping current ignore list");
        }
    }
}

// ============================================================================
// Shutdown signals
// ============================================================================

/// Waits for SIGTERM or SIGINT and cancels `token`
pub async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM, finishing current tick"),
    }

    token.cancel();
}
