//! Integration tests for the client-credentials token flow

use std::time::Duration;

use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use adsync_core::domain::{AuthError, IgnoreList};
use adsync_core::ports::IDirectorySource;
use adsync_graph::auth::{ClientCredentialsConfig, ClientCredentialsFlow};
use adsync_graph::client::RosterScope;

use crate::common;

#[tokio::test]
async fn test_request_token_posts_client_credentials() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(common::TOKEN_PATH))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_id=test-client"))
        .and(body_string_contains("client_secret=test-secret"))
        .and(body_string_contains("scope=https%3A%2F%2Fgraph.microsoft.com%2F.default"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "issued-token",
            "token_type": "Bearer",
            "expires_in": 3599
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = ClientCredentialsConfig::new(
        format!("{}{}", server.uri(), common::TOKEN_PATH),
        "test-client",
        "test-secret",
    )
    .with_timeout(Duration::from_secs(5));
    let flow = ClientCredentialsFlow::new(&config).unwrap();

    let token = flow.request_token().await.expect("token request failed");
    assert_eq!(token.secret(), "issued-token");
    assert!(!token.is_known_expired());
}

#[tokio::test]
async fn test_rejected_credentials() {
    let server = MockServer::start().await;
    common::mount_token_rejected(&server).await;

    let source = common::directory_source(&server, RosterScope::AllUsers, IgnoreList::new());
    let err = source.fetch_token().await.unwrap_err();

    match err {
        AuthError::Rejected(message) => assert!(message.contains("invalid_client")),
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn test_roster_with_rejected_credentials_is_unavailable() {
    let server = MockServer::start().await;
    common::mount_token_rejected(&server).await;
    common::mount_users(&server, serde_json::json!([common::user("Alice", "alice@x")])).await;

    let source = common::directory_source(&server, RosterScope::AllUsers, IgnoreList::new());
    assert!(source.roster().await.is_err());
}

#[tokio::test]
async fn test_fetch_token_replaces_held_token() {
    let server = MockServer::start().await;
    common::mount_token(&server, "token-1", 2).await;

    let source = common::directory_source(&server, RosterScope::AllUsers, IgnoreList::new());
    source.fetch_token().await.unwrap();
    source.fetch_token().await.unwrap();
}
