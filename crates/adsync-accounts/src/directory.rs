//! DirectoryAccountBackend - IAccountBackend over Active Directory
//!
//! Every operation is a single PowerShell invocation using the
//! ActiveDirectory module. Accounts are keyed by `UserPrincipalName`.
//! Query results come back through `ConvertTo-Json`, which emits a bare
//! object for one result, an array for several, and nothing for none.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use adsync_core::domain::{
    AccountError, AccountOptions, AccountRecord, GroupOptions, Principal,
};
use adsync_core::ports::IAccountBackend;

use crate::command::{CommandLine, CommandRunner};
use crate::validate_name;

const POWERSHELL: &str = "powershell";

// ============================================================================
// PowerShell helpers
// ============================================================================

/// Quotes `value` as a PowerShell single-quoted literal
pub fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Renders an option value: `$true`-style literals verbatim, anything else quoted
fn ps_value(value: &str) -> String {
    match value {
        "$true" | "$false" | "$null" => value.to_string(),
        other => ps_quote(other),
    }
}

fn ps_params(extra: impl IntoIterator<Item = (String, String)>) -> String {
    extra
        .into_iter()
        .map(|(name, value)| {
            let name = name.trim_start_matches('-');
            if value.is_empty() {
                format!(" -{name}")
            } else {
                format!(" -{name} {}", ps_value(&value))
            }
        })
        .collect()
}

/// `$user` bound to the account with the given principal name, or `$null`
fn find_user(upn: &str) -> String {
    format!(
        "$upn = {}; $user = Get-ADUser -Filter {{ UserPrincipalName -eq $upn }}",
        ps_quote(upn)
    )
}

fn powershell(script: &str, mutating: bool) -> CommandLine {
    let script = format!("$ErrorActionPreference = 'Stop'; {script}");
    let command = if mutating {
        CommandLine::new(POWERSHELL)
    } else {
        CommandLine::query(POWERSHELL)
    };
    command.args(["-NoProfile", "-NonInteractive", "-Command"]).arg(script)
}

/// Parses `ConvertTo-Json` output into a list
///
/// Empty output is an empty list and a single object a one-element list.
pub fn parse_json_list<T: DeserializeOwned>(stdout: &str) -> Result<Vec<T>, AccountError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let value: Value =
        serde_json::from_str(trimmed).map_err(|e| AccountError::Parse(e.to_string()))?;
    let items = match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        single => vec![single],
    };
    items
        .into_iter()
        .map(|item| serde_json::from_value(item).map_err(|e| AccountError::Parse(e.to_string())))
        .collect()
}

// ============================================================================
// ConvertTo-Json row types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UserRow {
    user_principal_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GroupRow {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AccountRow {
    user_principal_name: String,
    display_name: Option<String>,
    #[serde(default)]
    groups: Value,
}

fn string_list(value: Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s],
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

// ============================================================================
// DirectoryAccountBackend
// ============================================================================

/// Active Directory implementation of [`IAccountBackend`]
pub struct DirectoryAccountBackend {
    runner: Arc<dyn CommandRunner>,
}

impl DirectoryAccountBackend {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        info!(dry_run = runner.is_dry_run(), "Active Directory account backend initialized");
        Self { runner }
    }

    async fn query<T: DeserializeOwned>(&self, script: &str) -> Result<Vec<T>, AccountError> {
        let output = self.runner.run(&powershell(script, false)).await?;
        parse_json_list(&output.stdout)
    }

    async fn execute(&self, command: CommandLine) -> Result<(), AccountError> {
        debug!(command = %command, "Executing PowerShell");
        self.runner.run(&command).await.map(|_| ())
    }

    async fn exists(&self, username: &str) -> Result<bool, AccountError> {
        Ok(self
            .list_usernames()
            .await?
            .iter()
            .any(|u| u.eq_ignore_ascii_case(username)))
    }

    async fn group_exists(&self, name: &str) -> Result<bool, AccountError> {
        Ok(self
            .list_groupnames()
            .await?
            .iter()
            .any(|g| g.eq_ignore_ascii_case(name)))
    }
}

#[async_trait]
impl IAccountBackend for DirectoryAccountBackend {
    /// User principal names are case-insensitive in Active Directory
    fn case_insensitive_names(&self) -> bool {
        true
    }

    async fn list_usernames(&self) -> Result<Vec<String>, AccountError> {
        let rows: Vec<UserRow> = self
            .query("Get-ADUser -Filter * | Select-Object UserPrincipalName | ConvertTo-Json")
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|r| r.user_principal_name)
            .collect())
    }

    async fn list_groupnames(&self) -> Result<Vec<String>, AccountError> {
        let rows: Vec<GroupRow> = self
            .query("Get-ADGroup -Filter * | Select-Object Name | ConvertTo-Json")
            .await?;
        Ok(rows.into_iter().map(|r| r.name).collect())
    }

    async fn account(&self, username: &str) -> Result<Option<AccountRecord>, AccountError> {
        validate_name(username)?;
        let script = format!(
            "{}; if ($user) {{ [pscustomobject]@{{ UserPrincipalName = $user.UserPrincipalName; \
             DisplayName = (Get-ADUser $user -Properties DisplayName).DisplayName; \
             Groups = @(Get-ADPrincipalGroupMembership $user | Select-Object -ExpandProperty Name) }} \
             | ConvertTo-Json }}",
            find_user(username)
        );
        let rows: Vec<AccountRow> = self.query(&script).await?;
        Ok(rows.into_iter().next().map(|row| {
            AccountRecord::new(row.user_principal_name, row.display_name.unwrap_or_default())
                .with_groups(string_list(row.groups))
        }))
    }

    async fn create_account(
        &self,
        principal: &Principal,
        options: &AccountOptions,
    ) -> Result<(), AccountError> {
        let username = principal.principal_name();
        validate_name(username)?;
        if self.exists(username).await? {
            return Err(AccountError::AlreadyExists(username.to_string()));
        }
        if self.group_exists(username).await? {
            warn!(group = username, "Removing stale group carrying the new account's name");
            self.execute(powershell(
                &format!("Remove-ADGroup -Identity {} -Confirm:$false", ps_quote(username)),
                true,
            ))
            .await?;
        }

        let mut script = format!(
            "New-ADUser -Name {upn} -UserPrincipalName {upn} -DisplayName {display}{params}",
            upn = ps_quote(username),
            display = ps_quote(principal.display_name()),
            params = ps_params(options.resolved_extra(principal)),
        );
        let groups = options
            .primary_group
            .iter()
            .chain(options.supplementary_groups.iter());
        let mut joined = false;
        for group in groups {
            if !joined {
                script.push_str(&format!("; {}", find_user(username)));
                joined = true;
            }
            script.push_str(&format!(
                "; Add-ADGroupMember -Identity {} -Members $user",
                ps_quote(group)
            ));
        }

        info!(account = username, "Creating directory account");
        self.execute(powershell(&script, true)).await
    }

    async fn delete_account(&self, username: &str) -> Result<(), AccountError> {
        validate_name(username)?;
        if !self.exists(username).await? {
            return Err(AccountError::NotFound(username.to_string()));
        }

        info!(account = username, "Deleting directory account");
        self.execute(powershell(
            &format!("{}; Remove-ADUser -Identity $user -Confirm:$false", find_user(username)),
            true,
        ))
        .await?;

        if self.group_exists(username).await? {
            self.execute(powershell(
                &format!("Remove-ADGroup -Identity {} -Confirm:$false", ps_quote(username)),
                true,
            ))
            .await?;
        }
        Ok(())
    }

    async fn set_password(&self, username: &str, secret_hash: &str) -> Result<(), AccountError> {
        validate_name(username)?;
        if !self.exists(username).await? {
            return Err(AccountError::NotFound(username.to_string()));
        }

        // AD accepts only a clear-text secret; the configured value is used as-is
        let script = format!(
            "{}; Set-ADAccountPassword -Identity $user -Reset -NewPassword \
             (ConvertTo-SecureString -AsPlainText {} -Force)",
            find_user(username),
            ps_quote(secret_hash)
        );
        info!(account = username, "Setting directory account password");
        self.execute(powershell(&script, true).redact(secret_hash))
            .await
    }

    async fn ensure_group(&self, name: &str, options: &GroupOptions) -> Result<(), AccountError> {
        validate_name(name)?;
        if self.group_exists(name).await? {
            return Err(AccountError::AlreadyExists(name.to_string()));
        }

        let script = format!(
            "New-ADGroup -Name {}{}",
            ps_quote(name),
            ps_params(options.extra.clone())
        );
        info!(group = name, "Creating directory group");
        self.execute(powershell(&script, true)).await
    }

    async fn group_members(&self, name: &str) -> Result<Vec<String>, AccountError> {
        let script = format!(
            "$name = {}; $group = Get-ADGroup -Filter {{ Name -eq $name }}; \
             if ($group) {{ Get-ADGroupMember -Identity $group | Where-Object objectClass -eq 'user' \
             | Get-ADUser | Select-Object UserPrincipalName | ConvertTo-Json }}",
            ps_quote(name)
        );
        let rows: Vec<UserRow> = self.query(&script).await?;
        Ok(rows
            .into_iter()
            .filter_map(|r| r.user_principal_name)
            .collect())
    }

    async fn groups_for_user(&self, username: &str) -> Result<Vec<String>, AccountError> {
        validate_name(username)?;
        let script = format!(
            "{}; if ($user) {{ Get-ADPrincipalGroupMembership $user | Select-Object Name | ConvertTo-Json }}",
            find_user(username)
        );
        let rows: Vec<GroupRow> = self.query(&script).await?;
        Ok(rows.into_iter().map(|r| r.name).collect())
    }

    async fn reload(&self) -> Result<(usize, usize), AccountError> {
        let counts = (
            self.list_usernames().await?.len(),
            self.list_groupnames().await?.len(),
        );
        info!(
            users = counts.0,
            groups = counts.1,
            "Reloaded directory accounts"
        );
        Ok(counts)
    }
}
