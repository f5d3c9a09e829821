//! Integration tests for GraphDirectorySource::roster()

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use adsync_core::domain::{IgnoreList, Principal, RosterError};
use adsync_core::ports::IDirectorySource;
use adsync_graph::client::RosterScope;

use crate::common::{self, user};

fn names(roster: &[Principal]) -> Vec<&str> {
    roster.iter().map(Principal::principal_name).collect()
}

#[tokio::test]
async fn test_roster_lists_users_with_bearer_token() {
    let server = MockServer::start().await;
    common::mount_token(&server, "token-1", 1).await;

    Mock::given(method("GET"))
        .and(path("/users"))
        .and(query_param("$select", "displayName,userPrincipalName"))
        .and(header("Authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [user("Alice", "alice@x"), user("Bob", "bob@x")]
        })))
        .expect(2)
        .mount(&server)
        .await;

    let source = common::directory_source(&server, RosterScope::AllUsers, IgnoreList::new());

    let roster = source.roster().await.expect("roster failed");
    assert_eq!(names(&roster), vec!["alice@x", "bob@x"]);
    assert_eq!(roster[0].display_name(), "Alice");

    // The held token is reused on the next call
    let roster = source.roster().await.expect("second roster failed");
    assert_eq!(roster.len(), 2);
}

#[tokio::test]
async fn test_roster_excludes_ignored_and_strips_line_breaks() {
    let server = MockServer::start().await;
    common::mount_token(&server, "token-1", 1).await;
    common::mount_users(
        &server,
        json!([
            user("Alice", "alice@x\n"),
            user("Admin", "admin@x"),
            user("Bob", "bob@x\r\n"),
        ]),
    )
    .await;

    let source = common::directory_source(
        &server,
        RosterScope::AllUsers,
        IgnoreList::parse("admin@x, bob@x"),
    );

    let roster = source.roster().await.unwrap();
    assert_eq!(names(&roster), vec!["alice@x"]);
}

#[tokio::test]
async fn test_set_ignore_list_applies_to_next_roster() {
    let server = MockServer::start().await;
    common::mount_token(&server, "token-1", 1).await;
    common::mount_users(&server, json!([user("Alice", "alice@x"), user("Bob", "bob@x")])).await;

    let source = common::directory_source(&server, RosterScope::AllUsers, IgnoreList::new());
    assert_eq!(source.roster().await.unwrap().len(), 2);

    source.set_ignore_list(IgnoreList::parse("alice@x")).await;
    assert!(source.ignore_list().await.contains("alice@x"));
    assert_eq!(names(&source.roster().await.unwrap()), vec!["bob@x"]);
}

#[tokio::test]
async fn test_always_unauthorized_fetches_token_once() {
    let server = MockServer::start().await;
    common::mount_token(&server, "token-1", 1).await;

    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "code": "InvalidAuthenticationToken" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source = common::directory_source(&server, RosterScope::AllUsers, IgnoreList::new());

    let err = source.roster().await.unwrap_err();
    assert!(matches!(err, RosterError::Unavailable(_)));
}

#[tokio::test]
async fn test_expired_token_is_refreshed_and_retried_once() {
    let server = MockServer::start().await;
    common::mount_token(&server, "fresh-token", 2).await;

    // First listing is rejected, the retry succeeds
    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [user("Alice", "alice@x")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source = common::directory_source(&server, RosterScope::AllUsers, IgnoreList::new());
    source.fetch_token().await.unwrap();

    let roster = source.roster().await.expect("retry should succeed");
    assert_eq!(names(&roster), vec!["alice@x"]);
}

#[tokio::test]
async fn test_persistent_auth_failure_retries_once_then_unavailable() {
    let server = MockServer::start().await;
    common::mount_token(&server, "token", 2).await;

    // A body without `value` counts as an authorization failure
    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": { "code": "InvalidAuthenticationToken" }
        })))
        .expect(2)
        .mount(&server)
        .await;

    let source = common::directory_source(&server, RosterScope::AllUsers, IgnoreList::new());
    source.fetch_token().await.unwrap();

    let err = source.roster().await.unwrap_err();
    assert!(matches!(err, RosterError::Unavailable(_)));
}

#[tokio::test]
async fn test_server_error_is_not_retried() {
    let server = MockServer::start().await;
    common::mount_token(&server, "token", 1).await;

    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let source = common::directory_source(&server, RosterScope::AllUsers, IgnoreList::new());
    source.fetch_token().await.unwrap();

    assert!(matches!(
        source.roster().await,
        Err(RosterError::Unavailable(_))
    ));
}

#[tokio::test]
async fn test_group_members_follow_paging_and_skip_non_users() {
    let server = MockServer::start().await;
    common::mount_token(&server, "token", 1).await;

    Mock::given(method("GET"))
        .and(path("/groups/grp-1/members"))
        .and(query_param("$skiptoken", "page2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [user("Carol", "carol@x")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/groups/grp-1/members"))
        .and(query_param("$select", "displayName,userPrincipalName"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                user("Alice", "alice@x"),
                { "displayName": "Meeting Room Device" }
            ],
            "@odata.nextLink": format!(
                "{}/groups/grp-1/members?$skiptoken=page2",
                server.uri()
            )
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source = common::directory_source(
        &server,
        RosterScope::GroupMembers("grp-1".to_string()),
        IgnoreList::new(),
    );

    let roster = source.roster().await.unwrap();
    assert_eq!(names(&roster), vec!["alice@x", "carol@x"]);
}
