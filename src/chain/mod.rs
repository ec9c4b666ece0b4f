//! Chain Reader — balance lookups over Ethereum JSON-RPC.
//!
//! Read-only: nothing here signs or sends transactions.

pub mod types;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Context;
use reqwest::Client;
use serde_json::{json, Value};

use types::{Balance, JsonRpcRequest, JsonRpcResponse};

pub const NATIVE_DECIMALS: u8 = 18;
pub const USDC_DECIMALS: u8 = 6;

/// `balanceOf(address)`
const BALANCE_OF_SELECTOR: &str = "70a08231";

pub struct ChainReader {
    rpc_url: String,
    http: Client,
    request_id: AtomicU64,
}

impl ChainReader {
    pub fn new(rpc_url: impl Into<String>, timeout: Option<Duration>) -> anyhow::Result<Self> {
        let mut builder = Client::builder().use_rustls_tls();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            rpc_url: rpc_url.into(),
            http: builder.build().context("failed to build RPC client")?,
            request_id: AtomicU64::new(1),
        })
    }

    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn rpc(&self, method: &str, params: Value) -> anyhow::Result<Value> {
        let req = JsonRpcRequest::new(self.next_id(), method, params);

        let resp = self
            .http
            .post(&self.rpc_url)
            .json(&req)
            .send()
            .await
            .with_context(|| format!("RPC request {} failed", method))?;

        let status = resp.status();
        let body = resp.text().await.context("failed to read RPC response")?;
        if !status.is_success() {
            anyhow::bail!("RPC node returned {}: {}", status, body);
        }

        let rpc_resp: JsonRpcResponse = serde_json::from_str(&body).with_context(|| {
            let preview: String = body.chars().take(200).collect();
            format!("invalid JSON-RPC response (body: {})", preview)
        })?;

        if let Some(err) = rpc_resp.error {
            anyhow::bail!("{}", err);
        }
        rpc_resp
            .result
            .ok_or_else(|| anyhow::anyhow!("JSON-RPC response missing both result and error"))
    }

    /// Native gas-token balance.
    pub async fn native_balance(&self, address: &str) -> anyhow::Result<Balance> {
        let address = normalize_address(address)?;
        let result = self.rpc("eth_getBalance", json!([address, "latest"])).await?;
        let raw = parse_quantity(&result)?;
        tracing::debug!(%address, raw, "fetched native balance");
        Ok(Balance::new(raw, NATIVE_DECIMALS))
    }

    /// ERC-20 balance of `holder` in the `token` contract.
    pub async fn token_balance(
        &self,
        token: &str,
        holder: &str,
        decimals: u8,
    ) -> anyhow::Result<Balance> {
        let token = normalize_address(token)?;
        let holder = normalize_address(holder)?;
        let data = format!("0x{}{:0>64}", BALANCE_OF_SELECTOR, &holder[2..]);

        let result = self
            .rpc("eth_call", json!([{ "to": token, "data": data }, "latest"]))
            .await?;
        let raw = parse_quantity(&result)?;
        tracing::debug!(%token, %holder, raw, "fetched token balance");
        Ok(Balance::new(raw, decimals))
    }
}

/// Lowercased `0x` + 40 hex chars.
pub fn normalize_address(address: &str) -> anyhow::Result<String> {
    let hex_part = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .ok_or_else(|| anyhow::anyhow!("address must start with 0x: {}", address))?;
    if hex_part.len() != 40 {
        anyhow::bail!("address must be 20 bytes (40 hex chars): {}", address);
    }
    hex::decode(hex_part).with_context(|| format!("address is not hex: {}", address))?;
    Ok(format!("0x{}", hex_part.to_ascii_lowercase()))
}

/// Parse a hex quantity (`"0x1a"`, or a 32-byte `eth_call` word) into u128.
pub fn parse_quantity(value: &Value) -> anyhow::Result<u128> {
    let s = value
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("expected hex string, got {}", value))?;
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| anyhow::anyhow!("hex quantity missing 0x prefix: {}", s))?
        .trim_start_matches('0');
    if digits.is_empty() {
        return Ok(0);
    }
    if digits.len() > 32 {
        anyhow::bail!("quantity does not fit in 128 bits: {}", s);
    }
    u128::from_str_radix(digits, 16).with_context(|| format!("invalid hex quantity: {}", s))
}
