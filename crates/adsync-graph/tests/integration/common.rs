//! Shared test helpers for Graph integration tests
//!
//! Each helper mounts mock endpoints on a wiremock server; `directory_source`
//! returns a GraphDirectorySource pointing at that server.

use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use adsync_core::domain::IgnoreList;
use adsync_graph::auth::{ClientCredentialsConfig, ClientCredentialsFlow};
use adsync_graph::client::{GraphClient, RosterScope};
use adsync_graph::directory::GraphDirectorySource;

pub const TOKEN_PATH: &str = "/tenant/oauth2/v2.0/token";

/// Builds a directory source whose token endpoint and Graph base URL are the
/// mock server.
pub fn directory_source(
    server: &MockServer,
    scope: RosterScope,
    ignore_list: IgnoreList,
) -> GraphDirectorySource {
    let config = ClientCredentialsConfig::new(
        format!("{}{}", server.uri(), TOKEN_PATH),
        "test-client",
        "test-secret",
    )
    .with_timeout(Duration::from_secs(5));
    let flow = ClientCredentialsFlow::new(&config).expect("valid token config");
    let client = GraphClient::with_base_url(server.uri());
    GraphDirectorySource::new(flow, client, scope, ignore_list)
}

/// Mounts a token endpoint that issues `token`, expecting exactly `times` hits.
pub async fn mount_token(server: &MockServer, token: &str, times: u64) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": token,
            "token_type": "Bearer",
            "expires_in": 3599
        })))
        .expect(times)
        .mount(server)
        .await;
}

/// Mounts a token endpoint that rejects the client credentials.
pub async fn mount_token_rejected(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_client",
            "error_description": "AADSTS7000215: Invalid client secret provided."
        })))
        .mount(server)
        .await;
}

/// Mounts `GET /users` returning a single page with the given principals.
pub async fn mount_users(server: &MockServer, principals: Value) {
    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": principals })))
        .mount(server)
        .await;
}

pub fn user(display_name: &str, upn: &str) -> Value {
    json!({ "displayName": display_name, "userPrincipalName": upn })
}
