//! adsync Sync - reconciliation engine
//!
//! Provides:
//! - One-shot reconciliation of the directory roster against the local
//!   sync-group membership
//! - Serialized ticks and a timer/signal driven scheduler
//! - The post-creation hook
//!
//! ## Modules
//!
//! - [`engine`] - create/delete set computation and per-item application
//! - [`handler`] - serializes ticks and exposes the runtime controls
//! - [`hooks`] - user command run after each account creation
//! - [`scheduler`] - interval and on-demand tick triggering

pub mod engine;
pub mod handler;
pub mod hooks;
pub mod scheduler;

use thiserror::Error;

use adsync_core::domain::{AccountError, RosterError};

/// Errors that abort a whole reconciliation tick
///
/// Per-principal failures never surface here; they are collected in the
/// tick's summary instead.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The directory roster could not be fetched; nothing was changed
    #[error("Roster unavailable, tick aborted: {0}")]
    RosterUnavailable(#[from] RosterError),

    /// The local account list could not be read; nothing was changed
    #[error("Cannot read local accounts, tick aborted: {0}")]
    Backend(#[source] AccountError),
}
