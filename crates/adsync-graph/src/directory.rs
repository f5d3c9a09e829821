//! GraphDirectorySource - IDirectorySource implementation for Microsoft Graph
//!
//! Combines the [`ClientCredentialsFlow`] and the [`GraphClient`] to fulfil the
//! [`IDirectorySource`] port contract.
//!
//! ## Design Notes
//!
//! - The token sits behind a `tokio::sync::Mutex` that is held for the whole
//!   token request, so at most one request is ever in flight.
//! - `roster()` fetches a token at most once per call. A call that starts
//!   without a usable token spends its one fetch up front; otherwise the fetch
//!   is spent on the single retry after an authorization failure.
//! - The ignore list is applied after principal names are normalised.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use adsync_core::config::DirectoryConfig;
use adsync_core::domain::{AccessToken, AuthError, IgnoreList, Principal, RosterError};
use adsync_core::ports::IDirectorySource;

use crate::auth::{ClientCredentialsConfig, ClientCredentialsFlow};
use crate::client::{GraphClient, GraphPrincipal, RosterScope};
use crate::GraphError;

/// Microsoft Graph implementation of [`IDirectorySource`]
pub struct GraphDirectorySource {
    flow: ClientCredentialsFlow,
    client: GraphClient,
    scope: RosterScope,
    token: Mutex<Option<AccessToken>>,
    ignore_list: RwLock<IgnoreList>,
}

impl GraphDirectorySource {
    /// Creates a directory source from its parts
    pub fn new(
        flow: ClientCredentialsFlow,
        client: GraphClient,
        scope: RosterScope,
        ignore_list: IgnoreList,
    ) -> Self {
        Self {
            flow,
            client,
            scope,
            token: Mutex::new(None),
            ignore_list: RwLock::new(ignore_list),
        }
    }

    /// Builds the source described by the `directory` config section
    pub fn from_config(config: &DirectoryConfig) -> Result<Self, AuthError> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let credentials = ClientCredentialsConfig::new(
            config.token_endpoint(),
            config.client_id.clone(),
            config.client_secret.clone(),
        )
        .with_scope(config.scope.clone())
        .with_timeout(timeout);

        let flow = ClientCredentialsFlow::new(&credentials)?;
        let client = GraphClient::with_base_url(config.graph_base_url.clone())
            .with_timeout(timeout)
            .map_err(|e| AuthError::InvalidConfig(e.to_string()))?;
        let scope = match &config.group_id {
            Some(id) => RosterScope::GroupMembers(id.clone()),
            None => RosterScope::AllUsers,
        };

        Ok(Self::new(flow, client, scope, config.ignore_list()))
    }

    /// Returns the held token's secret, fetching one if none is usable
    ///
    /// # Returns
    /// The secret and whether a fetch happened.
    async fn usable_token(&self) -> Result<(String, bool), AuthError> {
        if let Some(token) = self.token.lock().await.as_ref() {
            if !token.is_known_expired() {
                return Ok((token.secret().to_string(), false));
            }
        }
        self.refresh().await.map(|secret| (secret, true))
    }

    /// Replaces the held token unconditionally and returns the new secret
    async fn refresh(&self) -> Result<String, AuthError> {
        let mut guard = self.token.lock().await;
        let token = self.flow.request_token().await?;
        let secret = token.secret().to_string();
        *guard = Some(token);
        Ok(secret)
    }

    async fn list(&self, secret: &str) -> Result<Vec<GraphPrincipal>, GraphError> {
        self.client.list_principals(secret, &self.scope).await
    }

    async fn filter(&self, listed: Vec<GraphPrincipal>) -> Vec<Principal> {
        let ignore_list = self.ignore_list.read().await;
        let total = listed.len();

        let roster: Vec<Principal> = listed
            .into_iter()
            .map(|p| Principal::new(p.display_name, p.user_principal_name))
            .filter(|p| !ignore_list.contains(p.principal_name()))
            .collect();

        debug!(
            total,
            ignored = total - roster.len(),
            "Applied ignore list to roster"
        );
        roster
    }
}

fn unavailable(context: &str, err: impl std::fmt::Display) -> RosterError {
    RosterError::Unavailable(format!("{context}: {err}"))
}

#[async_trait]
impl IDirectorySource for GraphDirectorySource {
    async fn fetch_token(&self) -> Result<(), AuthError> {
        self.refresh().await.map(|_| ())
    }

    async fn roster(&self) -> Result<Vec<Principal>, RosterError> {
        let (secret, fetched) = self
            .usable_token()
            .await
            .map_err(|e| unavailable("token fetch failed", e))?;

        let listed = match self.list(&secret).await {
            Ok(listed) => listed,
            Err(e) if e.is_auth_failure() && !fetched => {
                warn!(error = %e, "Roster request not authorized, refreshing token and retrying once");
                let secret = self
                    .refresh()
                    .await
                    .map_err(|e| unavailable("token refresh failed", e))?;
                self.list(&secret)
                    .await
                    .map_err(|e| unavailable("roster request failed after token refresh", e))?
            }
            Err(e) => return Err(unavailable("roster request failed", e)),
        };

        let roster = self.filter(listed).await;
        info!(principals = roster.len(), "Directory roster fetched");
        Ok(roster)
    }

    async fn set_ignore_list(&self, names: IgnoreList) {
        info!(entries = names.len(), "Ignore list replaced");
        *self.ignore_list.write().await = names;
    }

    async fn ignore_list(&self) -> IgnoreList {
        self.ignore_list.read().await.clone()
    }
}
