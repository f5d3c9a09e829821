//! LinuxAccountBackend - IAccountBackend over the shadow-utils tables
//!
//! Reads `/etc/passwd`, `/etc/shadow` and `/etc/group` directly and changes
//! them through `useradd`, `userdel`, `groupadd` and `groupdel`. Two edits
//! are made to the tables directly: the comment (GECOS) field after account
//! creation and the password hash.
//!
//! ## Design Notes
//!
//! - Nothing is cached; every call parses the tables again.
//! - Group membership counts both supplementary members listed in the group
//!   table and accounts whose primary group id is the group's id, so accounts
//!   created with `-g <sync group>` are seen as members.
//! - In a dry run the commands are printed and table writes are skipped.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use adsync_core::config::LinuxFilesConfig;
use adsync_core::domain::{
    AccountError, AccountOptions, AccountRecord, GroupOptions, Principal,
};
use adsync_core::ports::IAccountBackend;

use crate::command::{CommandLine, CommandRunner};
use crate::tables::{self, GroupEntry, PasswdEntry, GECOS_FIELD, PASSWORD_FIELD};
use crate::validate_name;

/// Linux implementation of [`IAccountBackend`]
pub struct LinuxAccountBackend {
    files: LinuxFilesConfig,
    runner: Arc<dyn CommandRunner>,
}

/// Parsed `passwd` and `group` tables
struct Snapshot {
    users: Vec<PasswdEntry>,
    groups: Vec<GroupEntry>,
}

impl Snapshot {
    fn user(&self, name: &str) -> Option<&PasswdEntry> {
        self.users.iter().find(|u| u.name == name)
    }

    fn group(&self, name: &str) -> Option<&GroupEntry> {
        self.groups.iter().find(|g| g.name == name)
    }

    fn members_of(&self, group: &GroupEntry) -> Vec<String> {
        let mut members: Vec<String> = self
            .users
            .iter()
            .filter(|u| u.gid == group.gid)
            .map(|u| u.name.clone())
            .collect();
        for member in &group.members {
            if !members.contains(member) {
                members.push(member.clone());
            }
        }
        members
    }

    fn groups_of(&self, user: &PasswdEntry) -> Vec<String> {
        self.groups
            .iter()
            .filter(|g| g.gid == user.gid || g.members.contains(&user.name))
            .map(|g| g.name.clone())
            .collect()
    }
}

/// Characters the comment field cannot carry
fn sanitize_gecos(display_name: &str) -> String {
    display_name
        .chars()
        .filter(|c| *c != ':' && !c.is_control())
        .collect()
}

impl LinuxAccountBackend {
    /// Creates a backend over the given tables
    ///
    /// # Arguments
    /// * `files` - Locations of `passwd`, `shadow` and `group`
    /// * `runner` - Executes (or, in a dry run, prints) the shadow-utils commands
    pub fn new(files: LinuxFilesConfig, runner: Arc<dyn CommandRunner>) -> Self {
        info!(
            passwd = %files.passwd.display(),
            shadow = %files.shadow.display(),
            group = %files.group.display(),
            dry_run = runner.is_dry_run(),
            "Linux account backend initialized"
        );
        Self { files, runner }
    }

    async fn snapshot(&self) -> Result<Snapshot, AccountError> {
        let passwd = tables::read_table(&self.files.passwd).await?;
        let group = tables::read_table(&self.files.group).await?;
        Ok(Snapshot {
            users: tables::parse_passwd(&passwd),
            groups: tables::parse_group(&group),
        })
    }

    fn useradd(&self, principal: &Principal, options: &AccountOptions) -> CommandLine {
        let mut command = CommandLine::new("useradd");
        if options.create_home {
            command = command.arg("-m");
        }
        if let Some(group) = &options.primary_group {
            command = command.arg("-g").arg(group);
        }
        if !options.supplementary_groups.is_empty() {
            command = command
                .arg("-G")
                .arg(options.supplementary_groups.join(","));
        }
        if let Some(shell) = &options.shell {
            command = command.arg("-s").arg(shell);
        }
        for (flag, value) in options.resolved_extra(principal) {
            command = command.arg(flag);
            if !value.is_empty() {
                command = command.arg(value);
            }
        }
        command.arg(principal.principal_name())
    }

    /// Rewrites one field of one line in `path`
    async fn patch_table(
        &self,
        path: &std::path::Path,
        key: &str,
        index: usize,
        value: &str,
    ) -> Result<bool, AccountError> {
        let content = tables::read_table(path).await?;
        match tables::set_field(&content, key, index, value) {
            Some(updated) if updated == content => Ok(true),
            Some(updated) => {
                tables::write_table(path, &updated).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl IAccountBackend for LinuxAccountBackend {
    async fn list_usernames(&self) -> Result<Vec<String>, AccountError> {
        let content = tables::read_table(&self.files.passwd).await?;
        Ok(tables::parse_passwd(&content)
            .into_iter()
            .map(|u| u.name)
            .collect())
    }

    async fn list_groupnames(&self) -> Result<Vec<String>, AccountError> {
        let content = tables::read_table(&self.files.group).await?;
        Ok(tables::parse_group(&content)
            .into_iter()
            .map(|g| g.name)
            .collect())
    }

    async fn account(&self, username: &str) -> Result<Option<AccountRecord>, AccountError> {
        let snapshot = self.snapshot().await?;
        Ok(snapshot.user(username).map(|user| {
            AccountRecord::new(user.name.clone(), user.gecos.clone())
                .with_groups(snapshot.groups_of(user))
        }))
    }

    async fn create_account(
        &self,
        principal: &Principal,
        options: &AccountOptions,
    ) -> Result<(), AccountError> {
        let username = principal.principal_name();
        validate_name(username)?;

        let snapshot = self.snapshot().await?;
        if snapshot.user(username).is_some() {
            return Err(AccountError::AlreadyExists(username.to_string()));
        }
        if snapshot.group(username).is_some() {
            warn!(group = username, "Removing stale group carrying the new account's name");
            self.runner
                .run(&CommandLine::new("groupdel").arg(username))
                .await?;
        }

        let command = self.useradd(principal, options);
        info!(account = username, command = %command, "Creating account");
        self.runner.run(&command).await?;

        if self.runner.is_dry_run() {
            debug!(account = username, "Dry run, comment field not written");
            return Ok(());
        }

        let gecos = sanitize_gecos(principal.display_name());
        if !self
            .patch_table(&self.files.passwd, username, GECOS_FIELD, &gecos)
            .await?
        {
            warn!(account = username, "Created account not found in passwd, comment not set");
        }
        Ok(())
    }

    async fn delete_account(&self, username: &str) -> Result<(), AccountError> {
        validate_name(username)?;
        if self.snapshot().await?.user(username).is_none() {
            return Err(AccountError::NotFound(username.to_string()));
        }

        info!(account = username, "Deleting account");
        self.runner
            .run(&CommandLine::new("userdel").arg("-r").arg(username))
            .await?;

        // userdel already drops a private group when USERGROUPS_ENAB is set
        let groups = self.list_groupnames().await?;
        if groups.iter().any(|g| g == username) {
            self.runner
                .run(&CommandLine::new("groupdel").arg(username))
                .await?;
        }
        Ok(())
    }

    async fn set_password(&self, username: &str, secret_hash: &str) -> Result<(), AccountError> {
        validate_name(username)?;
        if secret_hash.contains(|c: char| c == ':' || c.is_control()) {
            return Err(AccountError::Parse(
                "password hash contains a field separator".to_string(),
            ));
        }
        // A dry run never created the account it would set the password on
        if self.runner.is_dry_run() {
            println!("# set shadow password for {username}");
            info!(account = username, "Dry run, password not written");
            return Ok(());
        }

        if self.snapshot().await?.user(username).is_none() {
            return Err(AccountError::NotFound(username.to_string()));
        }

        // The hash lives in shadow; passwd only points there
        self.patch_table(&self.files.passwd, username, PASSWORD_FIELD, "x")
            .await?;
        if !self
            .patch_table(&self.files.shadow, username, PASSWORD_FIELD, secret_hash)
            .await?
        {
            return Err(AccountError::NotFound(format!("{username} (shadow)")));
        }

        info!(account = username, "Password set");
        Ok(())
    }

    async fn ensure_group(&self, name: &str, options: &GroupOptions) -> Result<(), AccountError> {
        validate_name(name)?;
        if self.snapshot().await?.group(name).is_some() {
            return Err(AccountError::AlreadyExists(name.to_string()));
        }

        let mut command = CommandLine::new("groupadd");
        for (flag, value) in &options.extra {
            command = command.arg(flag.as_str());
            if !value.is_empty() {
                command = command.arg(value.as_str());
            }
        }
        let command = command.arg(name);

        info!(group = name, command = %command, "Creating group");
        self.runner.run(&command).await?;
        Ok(())
    }

    async fn group_members(&self, name: &str) -> Result<Vec<String>, AccountError> {
        let snapshot = self.snapshot().await?;
        Ok(snapshot
            .group(name)
            .map(|g| snapshot.members_of(g))
            .unwrap_or_default())
    }

    async fn groups_for_user(&self, username: &str) -> Result<Vec<String>, AccountError> {
        let snapshot = self.snapshot().await?;
        Ok(snapshot
            .user(username)
            .map(|u| snapshot.groups_of(u))
            .unwrap_or_default())
    }

    async fn reload(&self) -> Result<(usize, usize), AccountError> {
        let snapshot = self.snapshot().await?;
        let counts = (snapshot.users.len(), snapshot.groups.len());
        info!(
            users = counts.0,
            groups = counts.1,
            "Reloaded account tables"
        );
        Ok(counts)
    }
}
