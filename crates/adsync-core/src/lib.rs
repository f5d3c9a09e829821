//! adsync Core - Domain types and ports for directory-to-local account sync
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Principal`, `IgnoreList`, `AccountRecord`, `AccessToken`
//! - **Port definitions** - Traits for adapters: `IDirectorySource`, `IAccountBackend`
//! - **Configuration** - Typed, validated daemon configuration
//!
//! # Architecture
//!
//! The domain module holds plain data with no I/O. Ports define the trait
//! interfaces the reconciliation engine depends on; the Graph adapter and
//! the account backends live in their own crates.

pub mod config;
pub mod domain;
pub mod ports;
