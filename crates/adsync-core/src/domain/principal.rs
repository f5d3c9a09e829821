//! Remote principals and the ignore list
//!
//! A [`Principal`] is one identity fetched from the remote directory. Its
//! `principal_name` is the matching key against local usernames; the display
//! name only ends up in the account's comment field.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// An identity record from the remote directory
///
/// Immutable once fetched. A roster is a full snapshot of these, replaced
/// wholesale on every fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    display_name: String,
    principal_name: String,
}

impl Principal {
    /// Creates a principal, stripping embedded line breaks from the name
    ///
    /// The directory occasionally returns principal names carrying stray
    /// `\n`/`\r` characters; those never match a local username.
    pub fn new(display_name: impl Into<String>, principal_name: impl AsRef<str>) -> Self {
        Self {
            display_name: display_name.into(),
            principal_name: normalize_principal_name(principal_name.as_ref()),
        }
    }

    /// The human-readable name (maps to the account comment field)
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// The unique key used for matching against local usernames
    pub fn principal_name(&self) -> &str {
        &self.principal_name
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.principal_name, self.display_name)
    }
}

/// Removes line-break characters from a principal name
pub fn normalize_principal_name(name: &str) -> String {
    name.chars().filter(|c| !matches!(c, '\n' | '\r')).collect()
}

/// Set of principal names excluded from every sync action
///
/// An ignored principal is never created, and never deleted even when it is
/// already a member of the sync group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreList(BTreeSet<String>);

impl IgnoreList {
    /// Creates an empty ignore list
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a comma and/or whitespace separated list of principal names
    ///
    /// `"a@x, b@x c@x"` yields three entries; empty fragments are dropped.
    pub fn parse(raw: &str) -> Self {
        raw.split(|c: char| c == ',' || c.is_whitespace())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(normalize_principal_name)
            .collect()
    }

    /// Returns true if `principal_name` is ignored
    pub fn contains(&self, principal_name: &str) -> bool {
        self.0.contains(principal_name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl FromIterator<String> for IgnoreList {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> FromIterator<&'a str> for IgnoreList {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        Self(iter.into_iter().map(str::to_string).collect())
    }
}
