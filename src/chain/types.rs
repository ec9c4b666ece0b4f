//! JSON-RPC 2.0 envelope and balance value types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[allow(dead_code)]
    pub jsonrpc: Option<String>,
    pub id: Option<u64>,
    pub result: Option<Value>,
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

/// An integer token amount with its decimal precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Balance {
    pub raw: u128,
    pub decimals: u8,
}

impl Balance {
    pub fn new(raw: u128, decimals: u8) -> Self {
        Self { raw, decimals }
    }
}

impl std::fmt::Display for Balance {
    /// Plain decimal, trailing zeros trimmed: `1.5`, `0.000001`, `42`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.decimals == 0 {
            return write!(f, "{}", self.raw);
        }
        let Some(scale) = 10u128.checked_pow(u32::from(self.decimals)) else {
            return write!(f, "{}e-{}", self.raw, self.decimals);
        };
        let whole = self.raw / scale;
        let frac = self.raw % scale;
        if frac == 0 {
            return write!(f, "{}", whole);
        }
        let frac = format!("{:0width$}", frac, width = self.decimals as usize);
        write!(f, "{}.{}", whole, frac.trim_end_matches('0'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_display() {
        assert_eq!(Balance::new(1_500_000, 6).to_string(), "1.5");
        assert_eq!(Balance::new(1, 6).to_string(), "0.000001");
        assert_eq!(Balance::new(42_000_000, 6).to_string(), "42");
        assert_eq!(Balance::new(0, 18).to_string(), "0");
        assert_eq!(Balance::new(7, 0).to_string(), "7");
    }

    #[test]
    fn test_request_serializes_envelope() {
        let req = JsonRpcRequest::new(3, "eth_getBalance", serde_json::json!(["0x0", "latest"]));
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["id"], 3);
        assert_eq!(json["method"], "eth_getBalance");
    }
}
