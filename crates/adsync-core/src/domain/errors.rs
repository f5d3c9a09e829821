//! Error types shared across the ports
//!
//! - [`AuthError`] - token acquisition failed
//! - [`RosterError`] - the roster could not be produced for this tick
//! - [`AccountError`] - a single account/group operation failed

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while acquiring a directory access token
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The token endpoint could not be reached
    #[error("Token request failed: {0}")]
    Transport(String),

    /// The token endpoint answered but refused the client credentials
    #[error("Token request rejected: {0}")]
    Rejected(String),

    /// The token endpoint or credentials are not usable as configured
    #[error("Invalid token configuration: {0}")]
    InvalidConfig(String),
}

/// Errors raised while fetching the directory roster
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RosterError {
    /// No roster this tick; local state must be left untouched
    #[error("Directory roster unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by account backend operations
#[derive(Debug, Error)]
pub enum AccountError {
    /// An account or group with this name already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// The account does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The name cannot be represented in the account store
    #[error("Invalid name: {0:?}")]
    InvalidName(String),

    /// An account-management primitive exited unsuccessfully
    #[error("Command `{command}` failed: {message}")]
    CommandFailed {
        /// The command line that was run
        command: String,
        /// Exit status and captured stderr
        message: String,
    },

    /// Reading or writing an account table failed
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Backend output could not be understood
    #[error("Unexpected backend output: {0}")]
    Parse(String),
}

impl AccountError {
    /// Returns true for the expected, per-item conditions the engine always
    /// logs and moves past
    pub fn is_expected(&self) -> bool {
        matches!(self, Self::AlreadyExists(_) | Self::NotFound(_))
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
