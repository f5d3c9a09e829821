//! Domain entities
//!
//! - Remote principals and the ignore list
//! - Local account and group records, account/group creation options
//! - The directory access token
//! - Error types shared across ports

pub mod account;
pub mod errors;
pub mod principal;
pub mod token;

pub use account::{AccountOptions, AccountRecord, GroupOptions, DISPLAY_NAME_TOKEN};
pub use errors::{AccountError, AuthError, RosterError};
pub use principal::{IgnoreList, Principal};
pub use token::AccessToken;
