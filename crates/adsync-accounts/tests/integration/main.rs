//! Integration tests for adsync-accounts
//!
//! Runs the Linux backend against account tables in a temporary directory,
//! with a command runner that applies useradd/userdel/groupadd/groupdel to
//! those tables the way shadow-utils would.

mod common;

mod test_linux;
