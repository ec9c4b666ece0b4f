use serde::{Deserialize, Serialize};

/// Body of `POST /v1/coinbase/onramp`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnrampRequest {
    pub payment_amount: String,
    pub payment_currency: String,
    pub payment_method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnrampSession {
    pub onramp_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_ip_omitted_when_unset() {
        let req = OnrampRequest {
            payment_amount: "25.00".into(),
            payment_currency: "USD".into(),
            payment_method: "CARD".into(),
            client_ip: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["paymentAmount"], "25.00");
        assert_eq!(json["paymentMethod"], "CARD");
        assert!(json.get("clientIp").is_none());
    }
}
