//! Directory source port (driven/secondary port)
//!
//! Produces the authoritative roster of remote principals. The primary
//! implementation targets Microsoft Graph, but nothing here is Graph-specific.
//!
//! ## Contract
//!
//! - `roster()` refreshes the access token at most once per call and retries
//!   the listing at most once; a second consecutive failure surfaces
//!   [`RosterError::Unavailable`].
//! - Ignored principals never appear in a roster.
//! - Principal names are returned with embedded line breaks stripped.

use crate::domain::{AuthError, IgnoreList, Principal, RosterError};

/// Port trait for the remote identity directory
#[async_trait::async_trait]
pub trait IDirectorySource: Send + Sync {
    /// Exchanges the client credentials for a fresh bearer token
    ///
    /// On success the token replaces any previously held one.
    async fn fetch_token(&self) -> Result<(), AuthError>;

    /// Fetches the current roster, minus ignored principals
    ///
    /// # Returns
    /// The principals in directory order
    async fn roster(&self) -> Result<Vec<Principal>, RosterError>;

    /// Replaces the ignore list; effective on the next `roster()` call
    async fn set_ignore_list(&self, names: IgnoreList);

    /// Snapshot of the ignore list currently in effect
    async fn ignore_list(&self) -> IgnoreList;
}
