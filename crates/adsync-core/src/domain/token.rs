//! Directory access token
//!
//! Owned exclusively by the directory source, never persisted. The secret is
//! kept out of `Debug` output.

use std::fmt;

use chrono::{DateTime, Duration, Utc};

/// Opaque bearer credential for the directory API
#[derive(Clone)]
pub struct AccessToken {
    secret: String,
    fetched_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    /// Wraps a freshly issued token; `expires_in` is what the token endpoint
    /// reported, if anything
    pub fn new(secret: impl Into<String>, expires_in: Option<Duration>) -> Self {
        let fetched_at = Utc::now();
        Self {
            secret: secret.into(),
            fetched_at,
            expires_at: expires_in.map(|d| fetched_at + d),
        }
    }

    /// The bearer value for the `Authorization` header
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Returns true only if the endpoint told us when the token expires and
    /// that moment has passed
    pub fn is_known_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("fetched_at", &self.fetched_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
