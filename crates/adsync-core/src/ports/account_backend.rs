//! Account backend port (driven/secondary port)
//!
//! CRUD over local accounts and groups. Two adapters exist: the Linux
//! flat-file backend and the directory-service (Windows AD) backend.
//!
//! ## Implementation Notes
//!
//! - Every operation re-reads backend state before acting. The store may be
//!   changed out-of-band between calls, so nothing is cached across calls.
//! - `ensure_group` is the raw create: it fails with
//!   [`AccountError::AlreadyExists`] when the group is present. Idempotence
//!   is the caller's job.

use crate::domain::{AccountError, AccountOptions, AccountRecord, GroupOptions, Principal};

/// Port trait for the account store being reconciled toward the roster
#[async_trait::async_trait]
pub trait IAccountBackend: Send + Sync {
    /// All account names, regardless of group membership
    async fn list_usernames(&self) -> Result<Vec<String>, AccountError>;

    /// All group names
    async fn list_groupnames(&self) -> Result<Vec<String>, AccountError>;

    /// Looks up a single account
    ///
    /// # Returns
    /// `None` if no account of that name exists
    async fn account(&self, username: &str) -> Result<Option<AccountRecord>, AccountError>;

    /// Creates an account for `principal`
    ///
    /// A stale group carrying the principal's name is removed first. After
    /// creation the account's display-name field is set to
    /// `principal.display_name()`.
    ///
    /// # Errors
    /// [`AccountError::AlreadyExists`] if the account already exists
    async fn create_account(
        &self,
        principal: &Principal,
        options: &AccountOptions,
    ) -> Result<(), AccountError>;

    /// Removes an account and the group mirroring its name, if any
    ///
    /// # Errors
    /// [`AccountError::NotFound`] if the account does not exist
    async fn delete_account(&self, username: &str) -> Result<(), AccountError>;

    /// Stores an already-hashed secret for the account
    ///
    /// # Errors
    /// [`AccountError::NotFound`] if the account does not exist
    async fn set_password(&self, username: &str, secret_hash: &str) -> Result<(), AccountError>;

    /// Creates a group
    ///
    /// # Errors
    /// [`AccountError::AlreadyExists`] if the group already exists
    async fn ensure_group(&self, name: &str, options: &GroupOptions) -> Result<(), AccountError>;

    /// Members of `name`; empty if the group does not exist
    async fn group_members(&self, name: &str) -> Result<Vec<String>, AccountError>;

    /// Groups `username` belongs to; empty if the account does not exist
    async fn groups_for_user(&self, username: &str) -> Result<Vec<String>, AccountError>;

    /// Re-reads backend state so the next tick starts from a consistent view
    ///
    /// # Returns
    /// `(account_count, group_count)` as observed
    async fn reload(&self) -> Result<(usize, usize), AccountError>;

    /// Returns true if the store treats names differing only in ASCII case
    /// as the same account
    fn case_insensitive_names(&self) -> bool {
        false
    }
}
