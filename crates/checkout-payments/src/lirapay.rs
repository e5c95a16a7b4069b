//! LiraPay Integration
//!
//! REST client for the LiraPay PIX API. Every request carries the static
//! `api-secret` header; there are no retries, failures surface to the
//! caller with the provider's status and error body.

use std::time::Duration;

use async_trait::async_trait;
use checkout_core::gateway::{CreateTransactionRequest, PaymentGateway};
use checkout_core::{CheckoutError, Transaction};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};

use crate::error::{PaymentError, Result};

pub const DEFAULT_API_BASE: &str = "https://api.lirapaybr.com";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const API_SECRET_HEADER: &str = "api-secret";

/// LiraPay credentials and endpoint
#[derive(Clone, Debug)]
pub struct LiraPayConfig {
    pub api_base: String,
    pub api_secret: SecretString,
    pub timeout: Duration,
}

impl LiraPayConfig {
    pub fn new(api_secret: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.into(),
            api_secret: SecretString::from(api_secret.into()),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Create from environment variables
    ///
    /// `LIRAPAY_API_SECRET` is required; `LIRAPAY_API_BASE` and
    /// `LIRAPAY_TIMEOUT_SECS` are optional.
    pub fn from_env() -> Result<Self> {
        let secret = std::env::var("LIRAPAY_API_SECRET")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| PaymentError::Config("LIRAPAY_API_SECRET not set".into()))?;

        let mut config = Self::new(secret);

        if let Ok(base) = std::env::var("LIRAPAY_API_BASE") {
            config.api_base = base.trim_end_matches('/').to_string();
        }

        if let Ok(raw) = std::env::var("LIRAPAY_TIMEOUT_SECS") {
            let secs = raw
                .parse::<u64>()
                .map_err(|e| PaymentError::Config(format!("LIRAPAY_TIMEOUT_SECS: {e}")))?;
            config.timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

/// LiraPay client
pub struct LiraPayClient {
    client: reqwest::Client,
    api_base: String,
}

impl LiraPayClient {
    /// Build a client with the secret baked into the default headers
    pub fn new(config: &LiraPayConfig) -> Result<Self> {
        let mut secret = HeaderValue::from_str(config.api_secret.expose_secret())
            .map_err(|e| PaymentError::Config(format!("Invalid API secret format: {e}")))?;
        secret.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(API_SECRET_HEADER, secret);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(&LiraPayConfig::from_env()?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_base)
    }

    fn create_request(&self, request: &CreateTransactionRequest) -> reqwest::Result<reqwest::Request> {
        self.client.post(self.url("/v1/transactions")).json(request).build()
    }

    fn lookup_request(&self, id: &str) -> reqwest::Result<reqwest::Request> {
        self.client.get(self.url(&format!("/v1/transactions/{id}"))).build()
    }

    async fn execute(&self, request: reqwest::Request) -> checkout_core::Result<(u16, String)> {
        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| CheckoutError::GatewayUnavailable(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| CheckoutError::GatewayUnavailable(e.to_string()))?;

        Ok((status, body))
    }
}

/// Map a non-2xx provider response
fn status_error(status: u16, body: String, transaction_id: Option<&str>) -> CheckoutError {
    match (status, transaction_id) {
        (404, Some(id)) => CheckoutError::NotFound(id.to_string()),
        _ => CheckoutError::Gateway {
            status,
            body: if body.trim().is_empty() { "{}".into() } else { body },
        },
    }
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

#[async_trait]
impl PaymentGateway for LiraPayClient {
    async fn create_transaction(&self, request: &CreateTransactionRequest) -> checkout_core::Result<Transaction> {
        request.validate()?;

        tracing::info!(
            external_id = %request.external_id,
            amount = %request.total_amount,
            items = request.items.len(),
            "Creating PIX transaction"
        );

        let http = self
            .create_request(request)
            .map_err(|e| CheckoutError::GatewayUnavailable(e.to_string()))?;
        let (status, body) = self.execute(http).await?;

        if !is_success(status) {
            tracing::error!(status, body = %body, "LiraPay rejected transaction");
            return Err(status_error(status, body, None));
        }

        let transaction: Transaction = serde_json::from_str(&body)?;

        tracing::info!(
            transaction_id = %transaction.id,
            status = %transaction.status,
            "PIX transaction created"
        );

        Ok(transaction)
    }

    async fn get_transaction(&self, id: &str) -> checkout_core::Result<Transaction> {
        let http = self
            .lookup_request(id)
            .map_err(|e| CheckoutError::GatewayUnavailable(e.to_string()))?;
        let (status, body) = self.execute(http).await?;

        if !is_success(status) {
            return Err(status_error(status, body, Some(id)));
        }

        Ok(serde_json::from_str(&body)?)
    }

    async fn account_info(&self) -> checkout_core::Result<serde_json::Value> {
        let http = self
            .client
            .get(self.url("/v1/account-info"))
            .build()
            .map_err(|e| CheckoutError::GatewayUnavailable(e.to_string()))?;
        let (status, body) = self.execute(http).await?;

        if !is_success(status) {
            return Err(status_error(status, body, None));
        }

        Ok(serde_json::from_str(&body)?)
    }

    fn name(&self) -> &str {
        "lirapay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkout_core::gateway::PAYMENT_METHOD_PIX;
    use checkout_core::{Customer, LineItem, TransactionStatus};
    use rust_decimal_macros::dec;

    fn client() -> LiraPayClient {
        let mut config = LiraPayConfig::new("sk_test_123");
        config.api_base = "https://lirapay.test/".into();
        LiraPayClient::new(&config).unwrap()
    }

    fn request() -> CreateTransactionRequest {
        CreateTransactionRequest {
            external_id: "pampers-1700000000000-abc123xyz".into(),
            total_amount: dec!(24.90),
            payment_method: PAYMENT_METHOD_PIX.into(),
            webhook_url: "https://shop.test/webhooks/lirapay".into(),
            items: vec![LineItem {
                id: "kit-pampers-premium".into(),
                title: "Kit".into(),
                description: String::new(),
                price: dec!(0.01),
                quantity: 1,
                is_physical: true,
            }],
            ip: "200.1.2.3".into(),
            customer: Customer {
                name: "Ana".into(),
                email: "ana@example.com".into(),
                phone: "11987654321".into(),
                document: "52998224725".into(),
                utm_source: Some("tiktok".into()),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_create_request_shape() {
        let http = client().create_request(&request()).unwrap();

        assert_eq!(http.method(), reqwest::Method::POST);
        assert_eq!(http.url().as_str(), "https://lirapay.test/v1/transactions");

        let body: serde_json::Value =
            serde_json::from_slice(http.body().and_then(|b| b.as_bytes()).unwrap()).unwrap();
        assert_eq!(body["total_amount"], serde_json::json!(24.9));
        assert_eq!(body["payment_method"], "PIX");
        assert_eq!(body["ip"], "200.1.2.3");
        assert_eq!(body["items"][0]["is_physical"], true);
        assert_eq!(body["customer"]["document_type"], "CPF");
        assert_eq!(body["customer"]["utm_source"], "tiktok");
        assert!(body["customer"].get("utm_medium").is_none());
    }

    #[test]
    fn test_lookup_request_url() {
        let http = client().lookup_request("tx_42").unwrap();
        assert_eq!(http.method(), reqwest::Method::GET);
        assert_eq!(http.url().as_str(), "https://lirapay.test/v1/transactions/tx_42");
    }

    #[test]
    fn test_status_errors() {
        assert!(matches!(status_error(404, String::new(), Some("tx_1")), CheckoutError::NotFound(id) if id == "tx_1"));

        match status_error(400, r#"{"message":"invalid document"}"#.into(), None) {
            CheckoutError::Gateway { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("invalid document"));
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(matches!(status_error(502, " ".into(), None), CheckoutError::Gateway { body, .. } if body == "{}"));
    }

    #[test]
    fn test_parse_provider_response() {
        let body = r#"{
            "id": "tx_abc",
            "external_id": "pampers-1-abc",
            "status": "PENDING",
            "total_value": 41.07,
            "customer": {"email": "ana@example.com", "name": "Ana"},
            "payment_method": "PIX",
            "pix": {"payload": "00020126580014br.gov.bcb.pix"},
            "hasError": false
        }"#;

        let tx: Transaction = serde_json::from_str(body).unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.total, dec!(41.07));
        assert_eq!(tx.pix_payload(), "00020126580014br.gov.bcb.pix");
    }

    #[tokio::test]
    async fn test_invalid_request_never_hits_network() {
        let mut req = request();
        req.items.clear();

        let err = client().create_transaction(&req).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Validation(_)));
    }
}
