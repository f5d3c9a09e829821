//! Tick scheduler - turns the sync interval and on-demand requests into ticks
//!
//! ## Flow
//!
//! ```text
//! interval timer ──┐
//! SIGUSR1 ─────────┼──→ TickScheduler::next_tick() ──→ SyncHandler::reconcile()
//! shutdown token ──┘         (None = stop)
//! ```
//!
//! The scheduler never runs a tick itself. The caller awaits
//! [`next_tick`](TickScheduler::next_tick), runs the tick to completion, and
//! only then asks again, so a shutdown request is honoured between ticks and
//! never interrupts one.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Why a tick is due
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickReason {
    /// The sync interval elapsed (the first one fires immediately)
    Interval,
    /// An out-of-cycle sync was requested
    Requested,
}

/// Handle used to request an immediate tick
///
/// Requests made while a tick is running coalesce into a single extra tick.
#[derive(Debug, Clone)]
pub struct SyncRequester {
    notify: Arc<Notify>,
}

impl SyncRequester {
    pub fn request_sync(&self) {
        info!("Out-of-cycle sync requested");
        self.notify.notify_one();
    }
}

/// Produces reconciliation ticks until cancelled
pub struct TickScheduler {
    interval: Interval,
    period: Duration,
    notify: Arc<Notify>,
    shutdown: CancellationToken,
}

impl TickScheduler {
    /// Creates a new scheduler
    ///
    /// # Arguments
    /// * `period` - Time between interval ticks
    /// * `shutdown` - Cancelling this token ends the tick stream
    pub fn new(period: Duration, shutdown: CancellationToken) -> Self {
        let mut interval = tokio::time::interval(period);
        // A tick that overruns the period must not be followed by a burst
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_secs = period.as_secs(), "Creating tick scheduler");

        Self {
            interval,
            period,
            notify: Arc::new(Notify::new()),
            shutdown,
        }
    }

    pub fn requester(&self) -> SyncRequester {
        SyncRequester {
            notify: self.notify.clone(),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Waits for the next tick
    ///
    /// # Returns
    /// The reason the tick is due, or `None` once shutdown was requested.
    pub async fn next_tick(&mut self) -> Option<TickReason> {
        if self.shutdown.is_cancelled() {
            return None;
        }

        let reason = tokio::select! {
            biased;

            _ = self.shutdown.cancelled() => {
                info!("Shutdown requested, no further ticks");
                return None;
            }

            _ = self.notify.notified() => {
                // The requested tick also restarts the interval
                self.interval.reset();
                TickReason::Requested
            }

            _ = self.interval.tick() => TickReason::Interval,
        };

        debug!(reason = ?reason, "Tick due");
        Some(reason)
    }
}
