//! Backend Session Client.
//!
//! Exchanges a provider token for a backend credential pair and performs
//! every authenticated call against the backend API.

pub mod client;

use async_trait::async_trait;

use crate::errors::ClientError;
use crate::models::session::{BackendSession, RefreshedToken};

pub use client::BackendClient;

pub const VERIFY_PATH: &str = "/v1/coinbase/verify";
pub const REFRESH_PATH: &str = "/v1/auth/refresh-token";
pub const TRANSACTIONS_PATH: &str = "/v1/transaction/all";
pub const WITHDRAW_PATH: &str = "/v1/transaction/withdraw";
pub const ONRAMP_PATH: &str = "/v1/coinbase/onramp";

/// The part of the backend the session orchestrator depends on.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Trade a provider token for a backend session. Never retried.
    async fn exchange(&self, provider_token: &str) -> Result<BackendSession, ClientError>;

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken, ClientError>;
}
