//! Reconciliation engine
//!
//! The [`ReconciliationEngine`] converges the membership of the local sync
//! group toward the directory roster.
//!
//! ## Tick Flow
//!
//! 1. **Fetch roster**: an unavailable roster aborts the tick untouched
//! 2. **Ensure sync group**: create it if missing; failure is non-fatal
//! 3. **Additions**: roster principals with no local account are created,
//!    given the standard password, and passed to the post-create hook
//! 4. **Removals**: sync-group members absent from the roster are deleted,
//!    except ignored principals
//! 5. **Converge**: the backend re-reads its state
//!
//! Every create/delete is isolated: a failure is recorded in the
//! [`ReconcileSummary`] and the batch continues.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use adsync_core::config::BackendConfig;
use adsync_core::domain::{AccountError, AccountOptions, GroupOptions, Principal};
use adsync_core::ports::{IAccountBackend, IDirectorySource};

use crate::hooks::PostCreateHook;
use crate::ReconcileError;

// ============================================================================
// ReconcileSummary
// ============================================================================

/// The backend operation an item failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    EnsureGroup,
    Create,
    SetPassword,
    PostCreateHook,
    ListMembers,
    Delete,
    Reload,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::EnsureGroup => "ensure_group",
            Operation::Create => "create_account",
            Operation::SetPassword => "set_password",
            Operation::PostCreateHook => "post_create_hook",
            Operation::ListMembers => "group_members",
            Operation::Delete => "delete_account",
            Operation::Reload => "reload",
        };
        f.write_str(name)
    }
}

/// A non-fatal failure recorded during a tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    /// Principal, account or group the operation targeted
    pub principal: String,
    pub operation: Operation,
    pub error: String,
}

/// Outcome of one completed reconciliation tick
#[derive(Debug, Clone)]
pub struct ReconcileSummary {
    pub tick_id: Uuid,
    /// Accounts created this tick
    pub created: Vec<String>,
    /// Accounts deleted this tick
    pub deleted: Vec<String>,
    /// Sync-group members kept because they are on the ignore list
    pub skipped_ignored: Vec<String>,
    /// Whether the sync group had to be created
    pub group_created: bool,
    pub failures: Vec<ItemFailure>,
    /// Wall-clock duration of the tick in milliseconds
    pub duration_ms: u64,
}

impl ReconcileSummary {
    fn new(tick_id: Uuid) -> Self {
        Self {
            tick_id,
            created: Vec::new(),
            deleted: Vec::new(),
            skipped_ignored: Vec::new(),
            group_created: false,
            failures: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Returns true if the tick made no change and recorded no failure
    pub fn is_noop(&self) -> bool {
        self.created.is_empty()
            && self.deleted.is_empty()
            && !self.group_created
            && self.failures.is_empty()
    }

    fn record_failure(&mut self, principal: &str, operation: Operation, err: impl fmt::Display) {
        self.failures.push(ItemFailure {
            principal: principal.to_string(),
            operation,
            error: err.to_string(),
        });
    }
}

// ============================================================================
// EngineSettings
// ============================================================================

/// What the engine applies to the accounts it manages
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Group whose membership marks an account as managed
    pub sync_group: String,
    pub account_options: AccountOptions,
    pub group_options: GroupOptions,
    /// Stored for every new account
    pub password_hash: String,
}

impl EngineSettings {
    /// Settings described by the `backend` config section
    pub fn from_config(backend: &BackendConfig) -> Self {
        Self {
            sync_group: backend.sync_group.clone(),
            account_options: backend.account_options(),
            group_options: backend.group_options(),
            password_hash: backend.standard_password_hash.clone(),
        }
    }
}

// ============================================================================
// ReconciliationEngine
// ============================================================================

/// Computes and applies the create/delete set between roster and sync group
pub struct ReconciliationEngine {
    directory: Arc<dyn IDirectorySource>,
    backend: Arc<dyn IAccountBackend>,
    settings: EngineSettings,
    hook: Option<PostCreateHook>,
}

impl ReconciliationEngine {
    /// Creates a new engine
    ///
    /// # Arguments
    /// * `directory` - Source of the authoritative roster
    /// * `backend` - Account store being reconciled
    /// * `settings` - Sync group, creation options and password hash
    pub fn new(
        directory: Arc<dyn IDirectorySource>,
        backend: Arc<dyn IAccountBackend>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            directory,
            backend,
            settings,
            hook: None,
        }
    }

    /// Runs `hook` after every successful account creation
    pub fn with_hook(mut self, hook: PostCreateHook) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn directory(&self) -> &Arc<dyn IDirectorySource> {
        &self.directory
    }

    /// Runs one reconciliation tick
    ///
    /// Not reentrant: callers must not overlap ticks (see
    /// [`SyncHandler`](crate::handler::SyncHandler)).
    ///
    /// # Returns
    /// A [`ReconcileSummary`] of a completed tick; per-item failures are
    /// recorded there.
    ///
    /// # Errors
    /// [`ReconcileError`] if the tick was aborted before any change.
    pub async fn reconcile(&self) -> Result<ReconcileSummary, ReconcileError> {
        let tick_id = Uuid::new_v4();
        self.run_tick(tick_id)
            .instrument(info_span!("reconcile", %tick_id))
            .await
    }

    async fn run_tick(&self, tick_id: Uuid) -> Result<ReconcileSummary, ReconcileError> {
        let start = Instant::now();
        let mut summary = ReconcileSummary::new(tick_id);
        info!(sync_group = %self.settings.sync_group, "Starting reconciliation");

        // Step 1: roster; nothing is touched if it cannot be fetched
        let roster = match self.directory.roster().await {
            Ok(roster) => roster,
            Err(e) => {
                error!(error = %e, "Roster unavailable, leaving local accounts untouched");
                return Err(e.into());
            }
        };
        let existing: HashSet<String> = self
            .backend
            .list_usernames()
            .await
            .map_err(|e| {
                error!(error = %e, "Cannot list local accounts");
                ReconcileError::Backend(e)
            })?
            .iter()
            .map(|u| self.name_key(u))
            .collect();

        // Step 2: sync group
        self.ensure_sync_group(&mut summary).await;

        // Steps 3-4: additions
        for principal in roster
            .iter()
            .filter(|p| !existing.contains(&self.name_key(p.principal_name())))
        {
            self.add(principal, &mut summary).await;
        }

        // Steps 5-6: removals
        self.remove_stale(&roster, &mut summary).await;

        // Step 7: converge
        if let Err(e) = self.backend.reload().await {
            warn!(error = %e, "Backend reload failed");
            summary.record_failure(&self.settings.sync_group, Operation::Reload, e);
        }

        summary.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            created = summary.created.len(),
            deleted = summary.deleted.len(),
            skipped_ignored = summary.skipped_ignored.len(),
            group_created = summary.group_created,
            failures = summary.failures.len(),
            duration_ms = summary.duration_ms,
            "Reconciliation complete"
        );
        Ok(summary)
    }

    /// Matching key for a principal or account name
    fn name_key(&self, name: &str) -> String {
        if self.backend.case_insensitive_names() {
            name.to_ascii_lowercase()
        } else {
            name.to_string()
        }
    }

    async fn ensure_sync_group(&self, summary: &mut ReconcileSummary) {
        let group = self.settings.sync_group.as_str();
        let groups = match self.backend.list_groupnames().await {
            Ok(groups) => groups,
            Err(e) => {
                warn!(group, error = %e, "Cannot list groups, not ensuring sync group");
                summary.record_failure(group, Operation::EnsureGroup, e);
                return;
            }
        };
        if groups.iter().any(|g| g == group) {
            debug!(group, "Sync group present");
            return;
        }

        match self
            .backend
            .ensure_group(group, &self.settings.group_options)
            .await
        {
            Ok(()) => {
                info!(group, "Sync group created");
                summary.group_created = true;
            }
            Err(AccountError::AlreadyExists(_)) => {
                info!(group, "Sync group appeared concurrently");
            }
            Err(e) => {
                warn!(group, error = %e, "Sync group creation failed, continuing");
                summary.record_failure(group, Operation::EnsureGroup, e);
            }
        }
    }

    async fn add(&self, principal: &Principal, summary: &mut ReconcileSummary) {
        let name = principal.principal_name();

        match self
            .backend
            .create_account(principal, &self.settings.account_options)
            .await
        {
            Ok(()) => {
                info!(account = name, display_name = principal.display_name(), "Account created");
                summary.created.push(name.to_string());
            }
            Err(e) => {
                if e.is_expected() {
                    info!(account = name, error = %e, "Account not created");
                } else {
                    warn!(account = name, error = %e, "Account creation failed");
                }
                summary.record_failure(name, Operation::Create, e);
                return;
            }
        }

        if let Err(e) = self
            .backend
            .set_password(name, &self.settings.password_hash)
            .await
        {
            warn!(account = name, error = %e, "Setting initial password failed");
            summary.record_failure(name, Operation::SetPassword, e);
        }

        if let Some(hook) = &self.hook {
            if let Err(e) = hook.run(principal).await {
                let message = format!("{e:#}");
                warn!(account = name, error = %message, "Post-create hook failed");
                summary.record_failure(name, Operation::PostCreateHook, message);
            }
        }
    }

    async fn remove_stale(&self, roster: &[Principal], summary: &mut ReconcileSummary) {
        let group = self.settings.sync_group.as_str();
        let owned = match self.backend.group_members(group).await {
            Ok(owned) => owned,
            Err(e) => {
                warn!(group, error = %e, "Cannot read sync group members, skipping removals");
                summary.record_failure(group, Operation::ListMembers, e);
                return;
            }
        };

        let wanted: HashSet<String> = roster
            .iter()
            .map(|p| self.name_key(p.principal_name()))
            .collect();
        let ignored = self.directory.ignore_list().await;

        for username in owned.iter().filter(|u| !wanted.contains(&self.name_key(u))) {
            if ignored.contains(username) {
                debug!(account = %username, "Ignored principal kept");
                summary.skipped_ignored.push(username.clone());
                continue;
            }

            match self.backend.delete_account(username).await {
                Ok(()) => {
                    info!(account = %username, "Account deleted");
                    summary.deleted.push(username.clone());
                }
                Err(e) => {
                    if e.is_expected() {
                        info!(account = %username, error = %e, "Account not deleted");
                    } else {
                        warn!(account = %username, error = %e, "Account deletion failed");
                    }
                    summary.record_failure(username, Operation::Delete, e);
                }
            }
        }
    }
}
