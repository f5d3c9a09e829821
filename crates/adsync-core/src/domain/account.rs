//! Local account entities and creation options
//!
//! [`AccountRecord`] is what a backend reports about an existing account.
//! [`AccountOptions`] and [`GroupOptions`] are the typed replacement for the
//! free-form flag maps handed to the account-creation primitives; anything a
//! backend does not model explicitly goes through `extra` verbatim.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::principal::Principal;

/// Pass-through option value replaced by the principal's display name
pub const DISPLAY_NAME_TOKEN: &str = "$AD_USER_FULLNAME";

/// A local account as seen by an account backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    /// Unique key; equals a principal name for managed accounts
    pub username: String,
    /// Comment / GECOS field
    pub display_name: String,
    /// Names of the groups the account belongs to
    pub groups: BTreeSet<String>,
}

impl AccountRecord {
    pub fn new(username: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            display_name: display_name.into(),
            groups: BTreeSet::new(),
        }
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    /// Returns true if the account is a member of `group`
    pub fn is_member_of(&self, group: &str) -> bool {
        self.groups.contains(group)
    }
}

/// Options applied when a backend creates an account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountOptions {
    /// Create the home directory (Linux `-m`)
    pub create_home: bool,
    /// Primary group (Linux `-g`)
    pub primary_group: Option<String>,
    /// Supplementary groups (Linux `-G`)
    pub supplementary_groups: Vec<String>,
    /// Login shell (Linux `-s`)
    pub shell: Option<String>,
    /// Backend-specific flags passed through verbatim; an empty value
    /// means the flag takes no argument
    pub extra: BTreeMap<String, String>,
}

impl AccountOptions {
    /// Returns true if accounts created with these options land in `group`
    pub fn includes_group(&self, group: &str) -> bool {
        self.primary_group.as_deref() == Some(group)
            || self.supplementary_groups.iter().any(|g| g == group)
    }

    /// Pass-through flags with [`DISPLAY_NAME_TOKEN`] substituted for `principal`
    pub fn resolved_extra(&self, principal: &Principal) -> Vec<(String, String)> {
        self.extra
            .iter()
            .map(|(flag, value)| {
                let value = if value == DISPLAY_NAME_TOKEN {
                    principal.display_name().to_string()
                } else {
                    value.clone()
                };
                (flag.clone(), value)
            })
            .collect()
    }
}

/// Options applied when a backend creates a group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupOptions {
    /// Backend-specific flags passed through verbatim
    pub extra: BTreeMap<String, String>,
}
