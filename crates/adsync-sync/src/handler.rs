//! Sync handler - the composition root the daemon drives
//!
//! Owns one [`ReconciliationEngine`] and guarantees that ticks never overlap,
//! whichever trigger (timer, `SIGUSR1`, one-shot) fires them.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use adsync_core::domain::IgnoreList;

use crate::engine::{ReconcileSummary, ReconciliationEngine};
use crate::ReconcileError;

/// Serializes reconciliation ticks over a single engine
#[derive(Clone)]
pub struct SyncHandler {
    engine: Arc<ReconciliationEngine>,
    tick_lock: Arc<Mutex<()>>,
}

impl SyncHandler {
    pub fn new(engine: ReconciliationEngine) -> Self {
        Self {
            engine: Arc::new(engine),
            tick_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Runs one tick, waiting for any tick already in flight to finish first
    pub async fn reconcile(&self) -> Result<ReconcileSummary, ReconcileError> {
        let _guard = match self.tick_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("Tick in flight, waiting");
                self.tick_lock.lock().await
            }
        };
        self.engine.reconcile().await
    }

    /// Replaces the ignore list used from the next tick on
    pub async fn set_ignore_list(&self, names: IgnoreList) {
        info!(count = names.len(), "Applying ignore list");
        self.engine.directory().set_ignore_list(names).await;
    }

    pub async fn ignore_list(&self) -> IgnoreList {
        self.engine.directory().ignore_list().await
    }

    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }
}
