use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The backend refused the provider token.
    #[error("{0}")]
    AuthExchange(String),

    #[error("no backend credential stored; sign in first")]
    MissingCredential,

    #[error("failed to refresh access token")]
    Refresh,

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("backend returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("credential store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl ClientError {
    /// Text shown to the user by the session state.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::AuthExchange(msg) => msg.clone(),
            ClientError::MissingCredential => "please sign in again".to_string(),
            ClientError::Refresh => "session expired, please sign in again".to_string(),
            ClientError::Network(e) => {
                tracing::debug!(error = %e, "transport failure");
                "authentication failed: could not reach the backend".to_string()
            }
            ClientError::Api { message, .. } => message.clone(),
            ClientError::Decode(_) | ClientError::Store(_) => {
                tracing::error!("Internal error: {}", self);
                "authentication failed".to_string()
            }
        }
    }

    /// Transient failures worth another attempt by background jobs.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Network(_) => true,
            ClientError::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Prefer the backend's own `message`, fall back to one derived from the status.
pub(crate) fn error_message(status: StatusCode, body: &Value) -> String {
    match body.get("message") {
        Some(Value::String(m)) if !m.is_empty() => m.clone(),
        // NestJS validation errors carry a list of messages
        Some(Value::Array(items)) if !items.is_empty() => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("; "),
        _ => format!("request failed with status {}", status.as_u16()),
    }
}
