//! Port definitions (hexagonal architecture interfaces)
//!
//! The reconciliation engine depends only on these traits; their
//! implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IDirectorySource`] - Remote roster of principals and its access token
//! - [`IAccountBackend`] - Local (or directory-backed) account store

pub mod account_backend;
pub mod directory_source;

pub use account_backend::IAccountBackend;
pub use directory_source::IDirectorySource;
