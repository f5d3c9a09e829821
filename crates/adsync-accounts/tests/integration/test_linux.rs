//! Integration tests for LinuxAccountBackend

use std::sync::Arc;

use adsync_accounts::command::DryRunCommandRunner;
use adsync_accounts::LinuxAccountBackend;
use adsync_core::domain::{AccountError, AccountOptions, GroupOptions, Principal};
use adsync_core::ports::IAccountBackend;

use crate::common::{self, FakeShadowUtils, Tables};

fn sync_group_options() -> AccountOptions {
    AccountOptions {
        create_home: true,
        primary_group: Some("azuread".into()),
        ..Default::default()
    }
}

async fn with_sync_group(backend: &LinuxAccountBackend) {
    backend
        .ensure_group("azuread", &GroupOptions::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_create_account_sets_comment_and_membership() {
    let tables = Tables::new();
    let (runner, backend) = common::linux_backend(&tables);
    with_sync_group(&backend).await;

    backend
        .create_account(&Principal::new("Alice Example", "alice@x"), &sync_group_options())
        .await
        .unwrap();

    assert!(runner
        .commands()
        .contains(&"useradd -m -g azuread alice@x".to_string()));
    assert!(tables.passwd().contains("alice@x:x:1000:1000:Alice Example:/home/alice@x:/bin/sh"));

    let record = backend.account("alice@x").await.unwrap().unwrap();
    assert_eq!(record.display_name, "Alice Example");
    assert!(record.is_member_of("azuread"));

    // Primary-group members count as members
    assert_eq!(backend.group_members("azuread").await.unwrap(), vec!["alice@x"]);
    assert_eq!(backend.groups_for_user("alice@x").await.unwrap(), vec!["azuread"]);
}

#[tokio::test]
async fn test_create_existing_account_runs_nothing() {
    let tables = Tables::new();
    let (runner, backend) = common::linux_backend(&tables);

    let err = backend
        .create_account(&Principal::new("Root", "root"), &AccountOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, AccountError::AlreadyExists(name) if name == "root"));
    assert!(runner.commands().is_empty());
}

#[tokio::test]
async fn test_create_removes_stale_same_name_group() {
    let tables = Tables::with(
        common::PASSWD,
        common::SHADOW,
        "root:x:0:\nazuread:x:1000:\nbob@x:x:1001:\n",
    );
    let (runner, backend) = common::linux_backend(&tables);

    backend
        .create_account(&Principal::new("Bob", "bob@x"), &sync_group_options())
        .await
        .unwrap();

    let commands = runner.commands();
    assert_eq!(commands[0], "groupdel bob@x");
    assert!(commands[1].starts_with("useradd"));
    assert!(!tables.group().contains("bob@x:x:1001:"));
}

#[tokio::test]
async fn test_invalid_name_rejected_before_any_command() {
    let tables = Tables::new();
    let (runner, backend) = common::linux_backend(&tables);

    let err = backend
        .create_account(&Principal::new("Eve", "eve:0:0@x"), &AccountOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, AccountError::InvalidName(_)));
    assert!(runner.commands().is_empty());
}

#[tokio::test]
async fn test_supplementary_group_membership() {
    let tables = Tables::new();
    let (_runner, backend) = common::linux_backend(&tables);
    with_sync_group(&backend).await;

    let options = AccountOptions {
        supplementary_groups: vec!["azuread".into()],
        ..Default::default()
    };
    backend
        .create_account(&Principal::new("Carol", "carol@x"), &options)
        .await
        .unwrap();

    assert!(tables.group().contains("azuread:x:1000:carol@x"));
    assert_eq!(backend.group_members("azuread").await.unwrap(), vec!["carol@x"]);
    assert_eq!(
        backend.groups_for_user("carol@x").await.unwrap(),
        vec!["azuread", "carol@x"]
    );
}

#[tokio::test]
async fn test_delete_account_and_private_group() {
    let tables = Tables::new();
    let (runner, backend) = common::linux_backend(&tables);
    backend
        .create_account(&Principal::new("Dave", "dave@x"), &AccountOptions::default())
        .await
        .unwrap();
    // Private group carried the user's name
    assert!(tables.group().contains("dave@x:x:"));

    backend.delete_account("dave@x").await.unwrap();

    assert!(runner.commands().contains(&"userdel -r dave@x".to_string()));
    assert!(!tables.passwd().contains("dave@x"));
    assert!(!tables.shadow().contains("dave@x"));
    assert!(!tables.group().contains("dave@x"));
}

#[tokio::test]
async fn test_delete_removes_leftover_same_name_group() {
    let tables = Tables::with(
        "root:x:0:0:root:/root:/bin/bash\nerin@x:x:1001:1000::/home/erin@x:/bin/sh\n",
        "root:*:19000:0:99999:7:::\nerin@x:!:19000:0:99999:7:::\n",
        "root:x:0:\nazuread:x:1000:\nerin@x:x:1005:\n",
    );
    let (runner, backend) = common::linux_backend(&tables);

    backend.delete_account("erin@x").await.unwrap();

    assert_eq!(
        runner.commands(),
        vec!["userdel -r erin@x".to_string(), "groupdel erin@x".to_string()]
    );
    assert!(!tables.group().contains("erin@x"));
}

#[tokio::test]
async fn test_delete_missing_account() {
    let tables = Tables::new();
    let (runner, backend) = common::linux_backend(&tables);

    let err = backend.delete_account("ghost@x").await.unwrap_err();
    assert!(matches!(err, AccountError::NotFound(_)));
    assert!(runner.commands().is_empty());
}

#[tokio::test]
async fn test_set_password_writes_shadow_hash() {
    let tables = Tables::with(
        "root:x:0:0:root:/root:/bin/bash\nalice@x:!:1001:1000::/home/alice@x:/bin/sh\n",
        "root:*:19000:0:99999:7:::\nalice@x:!:19000:0:99999:7:::\n",
        "root:x:0:\nazuread:x:1000:\n",
    );
    let (_runner, backend) = common::linux_backend(&tables);

    backend
        .set_password("alice@x", "$6$salt$hashvalue")
        .await
        .unwrap();

    assert!(tables
        .passwd()
        .contains("alice@x:x:1001:1000::/home/alice@x:/bin/sh"));
    assert!(tables
        .shadow()
        .contains("alice@x:$6$salt$hashvalue:19000:0:99999:7:::"));
    assert!(tables.shadow().starts_with("root:*:19000"));
}

#[tokio::test]
async fn test_set_password_rejects_separator_in_hash() {
    let tables = Tables::new();
    let (_runner, backend) = common::linux_backend(&tables);

    let err = backend.set_password("root", "bad:hash").await.unwrap_err();
    assert!(matches!(err, AccountError::Parse(_)));
    assert!(tables.shadow().starts_with("root:*:"));
}

#[tokio::test]
async fn test_set_password_missing_account() {
    let tables = Tables::new();
    let (_runner, backend) = common::linux_backend(&tables);

    let err = backend.set_password("ghost@x", "$6$x").await.unwrap_err();
    assert!(matches!(err, AccountError::NotFound(_)));
}

#[tokio::test]
async fn test_ensure_group_already_exists() {
    let tables = Tables::new();
    let (runner, backend) = common::linux_backend(&tables);
    with_sync_group(&backend).await;

    let err = backend
        .ensure_group("azuread", &GroupOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AccountError::AlreadyExists(_)));
    assert_eq!(runner.commands(), vec!["groupadd azuread".to_string()]);
}

#[tokio::test]
async fn test_group_members_of_missing_group_is_empty() {
    let tables = Tables::new();
    let (_runner, backend) = common::linux_backend(&tables);
    assert!(backend.group_members("azuread").await.unwrap().is_empty());
    assert!(backend.groups_for_user("ghost@x").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_command_failure_surfaces() {
    let tables = Tables::new();
    let runner = Arc::new(FakeShadowUtils::new(&tables.files).failing_on("useradd"));
    let backend = LinuxAccountBackend::new(tables.files.clone(), runner);

    let err = backend
        .create_account(&Principal::new("Fay", "fay@x"), &AccountOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AccountError::CommandFailed { .. }));
    assert!(!tables.passwd().contains("fay@x"));
}

#[tokio::test]
async fn test_reload_counts() {
    let tables = Tables::new();
    let (_runner, backend) = common::linux_backend(&tables);
    assert_eq!(backend.reload().await.unwrap(), (2, 2));
    assert_eq!(backend.list_usernames().await.unwrap(), vec!["root", "daemon"]);
    assert_eq!(backend.list_groupnames().await.unwrap(), vec!["root", "daemon"]);
}

#[tokio::test]
async fn test_dry_run_leaves_tables_untouched() {
    let tables = Tables::new();
    let runner = Arc::new(DryRunCommandRunner::new(FakeShadowUtils::new(&tables.files)));
    let backend = LinuxAccountBackend::new(tables.files.clone(), runner);

    backend
        .ensure_group("azuread", &GroupOptions::default())
        .await
        .unwrap();
    backend
        .create_account(&Principal::new("Gus", "gus@x"), &sync_group_options())
        .await
        .unwrap();
    // The account only exists on paper
    backend.set_password("gus@x", "$6$new").await.unwrap();
    backend.set_password("root", "$6$new").await.unwrap();

    assert_eq!(tables.passwd(), common::PASSWD);
    assert_eq!(tables.shadow(), common::SHADOW);
    assert_eq!(tables.group(), common::GROUP);
}
