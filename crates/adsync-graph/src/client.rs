//! Microsoft Graph API client
//!
//! Lists directory principals, either every user in the tenant or the members
//! of one group. Follows `@odata.nextLink` paging and classifies failures so
//! the directory source can tell an expired token from an outage.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use adsync_graph::client::{GraphClient, RosterScope};
//!
//! # async fn example() -> Result<(), adsync_graph::GraphError> {
//! let client = GraphClient::new();
//! let principals = client.list_principals("access-token", &RosterScope::AllUsers).await?;
//! println!("{} principals", principals.len());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::GraphError;

/// Base URL for Microsoft Graph API v1.0
const GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Properties requested for every principal
const SELECT: &str = "$select=displayName,userPrincipalName";

/// Upper bound on followed `@odata.nextLink` pages
const MAX_PAGES: usize = 1000;

// ============================================================================
// Graph API response types
// ============================================================================

/// One page of a collection response
#[derive(Debug, Deserialize)]
struct PageResponse {
    value: Option<Vec<DirectoryObject>>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

/// A user (or, for group members, any directory object)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectoryObject {
    display_name: Option<String>,
    user_principal_name: Option<String>,
}

/// A principal as returned by Graph, before normalisation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphPrincipal {
    pub display_name: String,
    pub user_principal_name: String,
}

/// Which collection makes up the roster
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterScope {
    /// `GET /users`
    AllUsers,
    /// `GET /groups/{id}/members`
    GroupMembers(String),
}

impl RosterScope {
    fn path(&self) -> String {
        match self {
            RosterScope::AllUsers => format!("/users?{SELECT}"),
            RosterScope::GroupMembers(id) => format!("/groups/{id}/members?{SELECT}"),
        }
    }
}

// ============================================================================
// GraphClient
// ============================================================================

/// HTTP client for the Microsoft Graph directory endpoints
///
/// Holds no credentials; the caller passes the bearer token per call so the
/// directory source stays the only owner of the token.
#[derive(Debug, Clone)]
pub struct GraphClient {
    /// The underlying HTTP client
    client: Client,
    /// Base URL for API requests
    base_url: String,
}

impl Default for GraphClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphClient {
    /// Creates a client for the public Graph endpoint
    pub fn new() -> Self {
        Self::with_base_url(GRAPH_BASE_URL)
    }

    /// Creates a client with a custom base URL (useful for testing)
    ///
    /// # Arguments
    /// * `base_url` - Base URL without trailing slash
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Applies a per-request timeout
    ///
    /// # Errors
    /// The underlying `reqwest` builder error if the client cannot be built.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, GraphError> {
        self.client = Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Lists every principal in `scope`, following all pages
    ///
    /// Objects without a `userPrincipalName` (devices, nested groups) are
    /// skipped; a missing display name becomes an empty string.
    ///
    /// # Arguments
    /// * `access_token` - Bearer token for the request
    /// * `scope` - Which collection to list
    pub async fn list_principals(
        &self,
        access_token: &str,
        scope: &RosterScope,
    ) -> Result<Vec<GraphPrincipal>, GraphError> {
        let mut url = format!("{}{}", self.base_url, scope.path());
        let mut principals = Vec::new();
        let mut skipped = 0usize;

        for page_number in 1..=MAX_PAGES {
            debug!(page = page_number, "Fetching roster page");
            let page = self.get_page(&url, access_token).await?;
            let objects = page.value.ok_or(GraphError::MissingValue)?;

            for object in objects {
                match object.user_principal_name {
                    Some(upn) if !upn.is_empty() => principals.push(GraphPrincipal {
                        display_name: object.display_name.unwrap_or_default(),
                        user_principal_name: upn,
                    }),
                    _ => skipped += 1,
                }
            }

            match page.next_link {
                Some(next) => url = next,
                None => {
                    debug!(
                        principals = principals.len(),
                        skipped,
                        pages = page_number,
                        "Roster listing complete"
                    );
                    return Ok(principals);
                }
            }
        }

        warn!(max_pages = MAX_PAGES, "Roster paging did not terminate");
        Err(GraphError::InvalidResponse(format!(
            "more than {MAX_PAGES} pages"
        )))
    }

    async fn get_page(&self, url: &str, access_token: &str) -> Result<PageResponse, GraphError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .send()
            .await?;

        let response = check_status(response).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| GraphError::InvalidResponse(e.to_string()))
    }
}

/// Maps a non-success status to the matching [`GraphError`]
async fn check_status(response: Response) -> Result<Response, GraphError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::UNAUTHORIZED => GraphError::Unauthorized(body),
        StatusCode::FORBIDDEN => GraphError::Forbidden(body),
        s if s.is_server_error() => GraphError::ServerError(format!("{s}: {body}")),
        s => GraphError::Status { status: s, body },
    })
}
