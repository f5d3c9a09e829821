//! Integration tests for adsync-graph
//!
//! Uses wiremock to simulate the Azure AD token endpoint and the Microsoft
//! Graph API, and verifies the token lifecycle and roster behavior of
//! GraphDirectorySource.

mod common;

mod test_roster;
mod test_token;
