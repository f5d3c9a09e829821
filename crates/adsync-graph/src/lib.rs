//! adsync Graph - Microsoft Graph directory source
//!
//! Provides the remote half of the sync:
//! - OAuth2 client-credentials token acquisition
//! - Paged roster listing (all users, or the members of one group)
//! - [`directory::GraphDirectorySource`], the `IDirectorySource` adapter that
//!   owns the token lifecycle and the ignore list
//!
//! ## Modules
//!
//! - [`auth`] - client-credentials token flow
//! - [`client`] - Microsoft Graph API HTTP client
//! - [`directory`] - `IDirectorySource` implementation

pub mod auth;
pub mod client;
pub mod directory;

use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur when communicating with the Microsoft Graph API
#[derive(Debug, Error)]
pub enum GraphError {
    /// The bearer token was rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The token is valid but lacks the directory read permission
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The response did not carry the expected `value` list
    #[error("Response has no principal list")]
    MissingValue,

    /// A server-side error occurred (5xx)
    #[error("Server error: {0}")]
    ServerError(String),

    /// Any other unexpected status
    #[error("Unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },

    /// A network-level error occurred
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The API response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl GraphError {
    /// Returns true if a fresh token may fix this failure
    ///
    /// The directory answers an expired token with 401, sometimes 403, and
    /// occasionally with a body that lacks the principal list.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized(_) | Self::Forbidden(_) | Self::MissingValue
        )
    }
}
