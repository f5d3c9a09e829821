//! adsync Accounts - account backend adapters
//!
//! Implementations of the `IAccountBackend` port:
//!
//! - [`linux::LinuxAccountBackend`] - `/etc/passwd`, `/etc/shadow` and
//!   `/etc/group` plus `useradd`/`userdel`/`groupadd`/`groupdel`
//! - [`directory::DirectoryAccountBackend`] - Active Directory through the
//!   PowerShell ActiveDirectory module
//!
//! Both backends run their primitives through a [`command::CommandRunner`], so
//! a dry run prints what would change instead of changing it.

pub mod command;
pub mod directory;
pub mod linux;
pub mod tables;

use adsync_core::domain::AccountError;

pub use command::{CommandLine, CommandOutput, CommandRunner, DryRunCommandRunner, SystemCommandRunner};
pub use directory::DirectoryAccountBackend;
pub use linux::LinuxAccountBackend;

/// Rejects names the account tables or command lines cannot carry
///
/// Names containing `:` or `,` would corrupt the colon/comma separated
/// tables; whitespace and control characters are never valid account names.
pub fn validate_name(name: &str) -> Result<(), AccountError> {
    let invalid = name.is_empty()
        || name.starts_with('-')
        || name
            .chars()
            .any(|c| c == ':' || c == ',' || c.is_whitespace() || c.is_control());
    if invalid {
        Err(AccountError::InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}
