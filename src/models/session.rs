use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::string_or_number;

/// Credential pair and user returned by `POST /v1/coinbase/verify`.
///
/// Replaced wholesale on every successful exchange, never patched field by
/// field (except the access token after a refresh).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendSession {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expire_in: String,
    #[serde(default)]
    pub refresh_expire_in: String,
    pub user: BackendUser,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendUser {
    pub wallet_address: String,
    pub role: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(default)]
    pub wallet_provider: Option<WalletProvider>,
    #[serde(default)]
    pub proxy_wallet_address: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub proxy_wallet_balance: Option<String>,
    #[serde(default)]
    pub status: Option<UserStatus>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletProvider {
    Metamask,
    Coinbase,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Pending,
    Banned,
    #[serde(other)]
    Unknown,
}

/// Body of `POST /v1/auth/refresh-token` on success (inside the envelope).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshedToken {
    pub access_token: String,
}
