use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::{json, Value};

use super::{SessionBackend, ONRAMP_PATH, REFRESH_PATH, TRANSACTIONS_PATH, VERIFY_PATH, WITHDRAW_PATH};
use crate::errors::{error_message, ClientError};
use crate::models::onramp::{OnrampRequest, OnrampSession};
use crate::models::session::{BackendSession, RefreshedToken};
use crate::models::transaction::{TransactionPage, TransactionQuery};
use crate::models::Envelope;
use crate::store::CredentialStore;

/// HTTP client for the wallet backend.
///
/// Holds no session state of its own: the bearer token is read from the
/// credential store on every authenticated call.
pub struct BackendClient {
    base_url: String,
    http: Client,
    store: Arc<dyn CredentialStore>,
}

impl BackendClient {
    pub fn new(
        base_url: impl Into<String>,
        store: Arc<dyn CredentialStore>,
        timeout: Option<Duration>,
    ) -> anyhow::Result<Self> {
        let mut builder = Client::builder()
            .use_rustls_tls()
            .user_agent(concat!("wallet-portal/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: builder.build()?,
            store,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Issue a request with `Authorization: Bearer <stored access token>`.
    ///
    /// Fails with [`ClientError::MissingCredential`] before touching the
    /// network when no token is stored.
    pub async fn authenticated_request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ClientError> {
        let token = self
            .store
            .get()
            .await?
            .ok_or(ClientError::MissingCredential)?;

        let mut req = self
            .http
            .request(method.clone(), self.url(path))
            .bearer_auth(token);
        if let Some(body) = body {
            req = req.json(body);
        }

        let (status, body) = read_body(req.send().await?).await?;
        if !status.is_success() {
            let message = error_message(status, &body);
            tracing::warn!(%method, path, status = %status, %message, "authenticated request failed");
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }

        tracing::debug!(%method, path, status = %status, "authenticated request ok");
        Ok(body)
    }

    pub async fn list_transactions(
        &self,
        query: &TransactionQuery,
    ) -> Result<TransactionPage, ClientError> {
        let path = format!("{}?{}", TRANSACTIONS_PATH, query.to_query_string());
        let body = self.authenticated_request(Method::GET, &path, None).await?;
        serde_json::from_value(body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// Bookkeeping call made after a withdrawal has been sent on-chain.
    pub async fn record_withdrawal(&self, tx_hash: &str) -> Result<Value, ClientError> {
        let body = json!({ "transactionHash": tx_hash });
        let resp = self
            .authenticated_request(Method::POST, WITHDRAW_PATH, Some(&body))
            .await?;
        Ok(match resp {
            Value::Object(mut map) if map.contains_key("data") => {
                map.remove("data").unwrap_or(Value::Null)
            }
            other => other,
        })
    }

    pub async fn create_onramp(&self, request: &OnrampRequest) -> Result<OnrampSession, ClientError> {
        let body = serde_json::to_value(request).map_err(|e| ClientError::Decode(e.to_string()))?;
        let resp = self
            .authenticated_request(Method::POST, ONRAMP_PATH, Some(&body))
            .await?;
        let env: Envelope<OnrampSession> =
            serde_json::from_value(resp).map_err(|e| ClientError::Decode(e.to_string()))?;
        Ok(env.data)
    }
}

#[async_trait]
impl SessionBackend for BackendClient {
    async fn exchange(&self, provider_token: &str) -> Result<BackendSession, ClientError> {
        let resp = self
            .http
            .post(self.url(VERIFY_PATH))
            .json(&json!({ "accessToken": provider_token }))
            .send()
            .await?;

        let (status, body) = read_body(resp).await?;
        if !status.is_success() {
            let message = error_message(status, &body);
            tracing::warn!(status = %status, %message, "backend rejected provider token");
            return Err(ClientError::AuthExchange(message));
        }

        let env: Envelope<BackendSession> =
            serde_json::from_value(body).map_err(|e| ClientError::Decode(e.to_string()))?;
        tracing::info!(
            wallet = %env.data.user.wallet_address,
            role = %env.data.user.role,
            "exchanged provider token for backend session"
        );
        Ok(env.data)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken, ClientError> {
        let resp = self
            .http
            .post(self.url(REFRESH_PATH))
            .json(&json!({ "refreshToken": refresh_token }))
            .send()
            .await?;

        if !resp.status().is_success() {
            tracing::warn!(status = %resp.status(), "refresh token rejected");
            return Err(ClientError::Refresh);
        }

        let env: Envelope<RefreshedToken> = resp
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        Ok(env.data)
    }
}

/// Read a response body as JSON.
///
/// Success bodies must parse (an empty body reads as `null`). Error bodies
/// that do not parse degrade to `{}` so the status-derived message is used.
async fn read_body(resp: Response) -> Result<(StatusCode, Value), ClientError> {
    let status = resp.status();
    let text = resp.text().await?;

    if !status.is_success() {
        return Ok((status, serde_json::from_str(&text).unwrap_or_else(|_| json!({}))));
    }
    if text.trim().is_empty() {
        return Ok((status, Value::Null));
    }
    let body = serde_json::from_str(&text).map_err(|e| {
        let preview: String = text.chars().take(200).collect();
        ClientError::Decode(format!("{} (body: {})", e, preview))
    })?;
    Ok((status, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, store: Arc<dyn CredentialStore>) -> BackendClient {
        BackendClient::new(server.uri(), store, None).unwrap()
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let c = BackendClient::new("http://localhost:3000/", Arc::new(MemoryStore::new()), None).unwrap();
        assert_eq!(c.base_url(), "http://localhost:3000");
        assert_eq!(c.url(VERIFY_PATH), "http://localhost:3000/v1/coinbase/verify");
    }

    #[tokio::test]
    async fn test_exchange_posts_provider_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(VERIFY_PATH))
            .and(body_json(json!({ "accessToken": "pt-123" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "data": {
                    "accessToken": "bt-1",
                    "refreshToken": "rt-1",
                    "expireIn": "1h",
                    "refreshExpireIn": "7d",
                    "user": { "walletAddress": "0xabc", "role": "user" }
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let c = client(&server, Arc::new(MemoryStore::new()));
        let session = c.exchange("pt-123").await.unwrap();
        assert_eq!(session.access_token, "bt-1");
        assert_eq!(session.refresh_token, "rt-1");
        assert_eq!(session.user.wallet_address, "0xabc");
    }

    #[tokio::test]
    async fn test_exchange_error_uses_backend_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(VERIFY_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "invalid token" })))
            .mount(&server)
            .await;

        let err = client(&server, Arc::new(MemoryStore::new()))
            .exchange("bad")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::AuthExchange(ref m) if m == "invalid token"));
    }

    #[tokio::test]
    async fn test_exchange_error_with_unparseable_body_uses_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(VERIFY_PATH))
            .respond_with(ResponseTemplate::new(500).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = client(&server, Arc::new(MemoryStore::new()))
            .exchange("pt")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "request failed with status 500");
    }

    #[tokio::test]
    async fn test_refresh_error_is_generic() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "expired" })))
            .mount(&server)
            .await;

        let err = client(&server, Arc::new(MemoryStore::new()))
            .refresh("rt-1")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Refresh));
    }

    #[tokio::test]
    async fn test_refresh_returns_new_access_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .and(body_json(json!({ "refreshToken": "rt-1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "accessToken": "bt-2" } })))
            .mount(&server)
            .await;

        let refreshed = client(&server, Arc::new(MemoryStore::new()))
            .refresh("rt-1")
            .await
            .unwrap();
        assert_eq!(refreshed.access_token, "bt-2");
    }

    #[tokio::test]
    async fn test_missing_credential_skips_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = client(&server, Arc::new(MemoryStore::new()))
            .list_transactions(&TransactionQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::MissingCredential));
    }

    #[tokio::test]
    async fn test_list_transactions_sends_bearer_and_sort() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(TRANSACTIONS_PATH))
            .and(header("authorization", "Bearer bt-1"))
            .and(query_param("type", "withdraw"))
            .and(query_param("page", "2"))
            .and(query_param("take", "5"))
            .and(query_param("sortBy", "createdAt"))
            .and(query_param("order", "DESC"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "id": 7, "type": "withdraw", "amount": "3.5", "status": "completed" }],
                "total": 6,
                "page": 2,
                "take": 5
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::with_tokens("bt-1", "rt-1"));
        let page = client(&server, store)
            .list_transactions(&TransactionQuery {
                kind: Some("withdraw".into()),
                page: 2,
                take: 5,
            })
            .await
            .unwrap();
        assert_eq!(page.total, 6);
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].id.as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn test_authenticated_error_surfaces_status_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(WITHDRAW_PATH))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({ "message": "banned" })))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::with_tokens("bt-1", "rt-1"));
        let err = client(&server, store).record_withdrawal("0xfeed").await.unwrap_err();
        match err {
            ClientError::Api { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "banned");
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_onramp_returns_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ONRAMP_PATH))
            .and(header("authorization", "Bearer bt-1"))
            .and(body_json(json!({
                "paymentAmount": "20",
                "paymentCurrency": "USD",
                "paymentMethod": "CARD"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "data": { "onrampUrl": "https://pay.example/session/1" }
            })))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::with_tokens("bt-1", "rt-1"));
        let session = client(&server, store)
            .create_onramp(&OnrampRequest {
                payment_amount: "20".into(),
                payment_currency: "USD".into(),
                payment_method: "CARD".into(),
                client_ip: None,
            })
            .await
            .unwrap();
        assert_eq!(session.onramp_url, "https://pay.example/session/1");
    }
}
