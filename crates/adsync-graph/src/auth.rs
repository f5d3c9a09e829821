//! OAuth2 client-credentials flow for Microsoft Graph
//!
//! The daemon authenticates as an application (no user interaction): it posts
//! its client id and secret to the tenant's token endpoint and receives a
//! bearer token for the `.default` Graph scope.
//!
//! ## Components
//!
//! - [`ClientCredentialsConfig`] - endpoint, credentials and scope
//! - [`ClientCredentialsFlow`] - performs the token exchange

use std::time::Duration;

use adsync_core::domain::{AccessToken, AuthError};
use oauth2::{
    basic::BasicClient, AuthType, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
    RequestTokenError, Scope, TokenResponse, TokenUrl,
};
use tracing::{debug, info, warn};

/// Default OAuth2 scope for application access to Microsoft Graph
pub const DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";

// ============================================================================
// ClientCredentialsConfig
// ============================================================================

/// Configuration for the client-credentials grant
#[derive(Clone)]
pub struct ClientCredentialsConfig {
    /// Full token endpoint URL
    pub token_url: String,
    /// Application (client) ID from the Azure AD app registration
    pub client_id: String,
    /// Client secret from the app registration
    pub client_secret: String,
    /// Scope to request
    pub scope: String,
    /// Timeout for the token request
    pub timeout: Duration,
}

impl ClientCredentialsConfig {
    /// Creates a config with the default Graph scope and a 30 second timeout
    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: DEFAULT_SCOPE.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl std::fmt::Debug for ClientCredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentialsConfig")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("scope", &self.scope)
            .finish()
    }
}

// ============================================================================
// ClientCredentialsFlow
// ============================================================================

/// Client-credentials token exchange using the `oauth2` crate
pub struct ClientCredentialsFlow {
    client: BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>,
    http_client: reqwest::Client,
    scope: String,
}

impl ClientCredentialsFlow {
    /// Creates a new flow from the given configuration
    ///
    /// # Errors
    /// [`AuthError::InvalidConfig`] if the token URL is malformed or the HTTP
    /// client cannot be built.
    pub fn new(config: &ClientCredentialsConfig) -> Result<Self, AuthError> {
        let token_url = TokenUrl::new(config.token_url.clone())
            .map_err(|e| AuthError::InvalidConfig(format!("token URL: {e}")))?;

        let client = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_client_secret(ClientSecret::new(config.client_secret.clone()))
            .set_auth_type(AuthType::RequestBody)
            .set_token_uri(token_url);

        // Token endpoints must not redirect
        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(config.timeout)
            .build()
            .map_err(|e| AuthError::InvalidConfig(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            http_client,
            scope: config.scope.clone(),
        })
    }

    /// Requests a new access token
    ///
    /// # Returns
    /// The issued token; its expiry is recorded when the endpoint reports one.
    pub async fn request_token(&self) -> Result<AccessToken, AuthError> {
        debug!("Requesting directory access token");

        let token_result = self
            .client
            .exchange_client_credentials()
            .add_scope(Scope::new(self.scope.clone()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| match e {
                RequestTokenError::ServerResponse(response) => {
                    warn!(error = %response, "Token endpoint rejected the client credentials");
                    AuthError::Rejected(response.to_string())
                }
                other => {
                    warn!(error = %other, "Token request failed");
                    AuthError::Transport(other.to_string())
                }
            })?;

        let expires_in = token_result
            .expires_in()
            .and_then(|d| chrono::Duration::from_std(d).ok());

        info!(
            expires_in_secs = expires_in.map(|d| d.num_seconds()),
            "Directory access token fetched"
        );
        Ok(AccessToken::new(
            token_result.access_token().secret().as_str(),
            expires_in,
        ))
    }
}
