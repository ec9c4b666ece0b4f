use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// USDC on Base Sepolia.
pub const DEFAULT_USDC_ADDRESS: &str = "0x036CbD53842c5426634e7929541eC2318f3dCF7e";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Backend base URL, without the `/v1` prefix.
    pub api_url: String,
    pub credentials_path: PathBuf,
    /// 64 hex chars. When set, stored tokens are sealed with AES-256-GCM.
    pub store_key: Option<String>,
    pub rpc_url: String,
    pub usdc_address: String,
    /// Per-request timeout. Unset means the platform default.
    pub http_timeout_secs: Option<u64>,
    /// Retries per withdrawal record after the first attempt.
    pub record_max_retries: u32,
    pub record_backoff_ms: u64,
}

impl Config {
    pub fn http_timeout(&self) -> Option<Duration> {
        self.http_timeout_secs.map(Duration::from_secs)
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let store_key = std::env::var("PORTAL_STORE_KEY")
        .ok()
        .filter(|k| !k.trim().is_empty());

    if store_key.is_none() {
        let env_mode = std::env::var("PORTAL_ENV")
            .or_else(|_| std::env::var("RUST_ENV"))
            .unwrap_or_default();
        if env_mode == "production" {
            anyhow::bail!(
                "PORTAL_STORE_KEY is not set. Plaintext credential storage is not \
                 allowed in production; set a 64-char hex key."
            );
        }
        tracing::debug!("PORTAL_STORE_KEY not set; backend tokens are stored in plaintext");
    }

    Ok(Config {
        api_url: std::env::var("PORTAL_API_URL")
            .unwrap_or_else(|_| "http://localhost:3000".into())
            .trim_end_matches('/')
            .to_string(),
        credentials_path: std::env::var("PORTAL_CREDENTIALS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".wallet-portal/credentials.json")),
        store_key,
        rpc_url: std::env::var("PORTAL_RPC_URL")
            .unwrap_or_else(|_| "https://sepolia.base.org".into()),
        usdc_address: std::env::var("PORTAL_USDC_ADDRESS")
            .unwrap_or_else(|_| DEFAULT_USDC_ADDRESS.into()),
        http_timeout_secs: std::env::var("PORTAL_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|secs| *secs > 0),
        record_max_retries: std::env::var("PORTAL_RECORD_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3),
        record_backoff_ms: std::env::var("PORTAL_RECORD_BACKOFF_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1000),
    })
}
