use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::string_or_number;

/// One row of the user's transaction history. Fields the backend adds later
/// are kept in `extra` rather than dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub amount: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub transaction_hash: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `GET /v1/transaction/all` is not wrapped in the usual data envelope;
/// pagination metadata sits next to `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionPage {
    pub data: Vec<Transaction>,
    pub total: u64,
    pub page: u32,
    pub take: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionQuery {
    pub kind: Option<String>,
    pub page: u32,
    pub take: u32,
}

impl Default for TransactionQuery {
    fn default() -> Self {
        Self {
            kind: None,
            page: 1,
            take: 10,
        }
    }
}

impl TransactionQuery {
    /// Newest first, always.
    pub fn to_query_string(&self) -> String {
        let mut qs = url::form_urlencoded::Serializer::new(String::new());
        if let Some(kind) = &self.kind {
            qs.append_pair("type", kind);
        }
        qs.append_pair("page", &self.page.to_string())
            .append_pair("take", &self.take.to_string())
            .append_pair("sortBy", "createdAt")
            .append_pair("order", "DESC");
        qs.finish()
    }
}
