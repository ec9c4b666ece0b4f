//! Wallet Portal — library crate.
//!
//! Session handoff from an embedded-wallet provider to the wallet backend,
//! credential persistence, and the authenticated backend calls built on it.

pub mod backend;
pub mod chain;
pub mod config;
pub mod errors;
pub mod jobs;
pub mod models;
pub mod session;
pub mod store;
