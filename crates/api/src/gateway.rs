//! HTTP client for a hosted-checkout payment provider.
//!
//! The provider exposes two endpoints:
//!
//! - `POST {base}/checkout/sessions` opens a checkout and answers
//!   `{ "status": "success", "token": ..., "paymentPageUrl": ... }`.
//! - `GET {base}/checkout/sessions/{token}` reports the result as
//!   `{ "status": ..., "paymentStatus": ..., "cardType": ..., ... }`.
//!
//! A payment succeeded only when both `status` is `"success"` and
//! `paymentStatus` is `"SUCCESS"`.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use ui_analyzer_core::{
    CheckoutRequest, CheckoutSession, GatewayError, PaymentGateway, PaymentInfo, SessionResult,
};

/// Connection settings for [`HttpCheckoutGateway`].
#[derive(Debug, Clone)]
pub struct HttpGatewayConfig {
    /// Provider API root, e.g. `https://sandbox-api.example.com/v1/`.
    pub base_url: String,
    pub api_key: String,
    /// Name stored on each subscription as its payment provider.
    pub provider: String,
    pub timeout: Duration,
}

impl HttpGatewayConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            provider: "iyzico".to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Read `PAYMENT_GATEWAY_URL` and `PAYMENT_GATEWAY_API_KEY`.
    ///
    /// Returns `None` unless both are set.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("PAYMENT_GATEWAY_URL").ok()?;
        let api_key = std::env::var("PAYMENT_GATEWAY_API_KEY").ok()?;
        let mut config = Self::new(base_url, api_key);
        if let Ok(provider) = std::env::var("PAYMENT_GATEWAY_PROVIDER") {
            config = config.provider(provider);
        }
        Some(config)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeResponse {
    status: String,
    token: Option<String>,
    payment_page_url: Option<String>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetrieveResponse {
    status: String,
    payment_status: Option<String>,
    card_type: Option<String>,
    card_association: Option<String>,
    card_family: Option<String>,
    last_four_digits: Option<String>,
}

/// [`PaymentGateway`] over the provider's JSON API.
pub struct HttpCheckoutGateway {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
    provider: String,
}

impl HttpCheckoutGateway {
    pub fn new(config: HttpGatewayConfig) -> Result<Self, GatewayError> {
        let mut base_url = Url::parse(&config.base_url)
            .map_err(|e| GatewayError::Transport(format!("invalid base URL: {}", e)))?;
        // Joining relative paths keeps the last segment only with a trailing slash.
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key,
            provider: config.provider,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        self.base_url
            .join(path)
            .map_err(|e| GatewayError::Transport(format!("invalid endpoint {}: {}", path, e)))
    }

    /// Map status classes: 4xx is a refusal, anything else unsuccessful is a fault.
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        if status.is_client_error() {
            Err(GatewayError::Rejected(format!("{}: {}", status, body)))
        } else {
            Err(GatewayError::Transport(format!("{}: {}", status, body)))
        }
    }
}

fn transport(err: reqwest::Error) -> GatewayError {
    GatewayError::Transport(err.to_string())
}

#[async_trait]
impl PaymentGateway for HttpCheckoutGateway {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let response = self
            .client
            .post(self.endpoint("checkout/sessions")?)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(transport)?;
        let response = Self::check_status(response).await?;

        let body: InitializeResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        if body.status != "success" {
            return Err(GatewayError::Rejected(
                body.error_message
                    .unwrap_or_else(|| "Checkout initialization failed".to_string()),
            ));
        }

        match (body.token, body.payment_page_url) {
            (Some(session_handle), Some(redirect_url)) => Ok(CheckoutSession {
                session_handle,
                redirect_url,
            }),
            _ => Err(GatewayError::Malformed(
                "missing token or paymentPageUrl".to_string(),
            )),
        }
    }

    async fn retrieve_session_result(
        &self,
        session_handle: &str,
    ) -> Result<SessionResult, GatewayError> {
        let mut url = self.endpoint("checkout/sessions/")?;
        url.path_segments_mut()
            .map_err(|_| GatewayError::Transport("base URL cannot hold a path".to_string()))?
            .pop_if_empty()
            .push(session_handle);

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(transport)?;
        let response = Self::check_status(response).await?;

        let body: RetrieveResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        let succeeded =
            body.status == "success" && body.payment_status.as_deref() == Some("SUCCESS");

        Ok(SessionResult {
            succeeded,
            payment_info: PaymentInfo {
                card_type: body.card_type,
                card_association: body.card_association,
                card_family: body.card_family,
                last_four_digits: body.last_four_digits,
                payment_status: Some(
                    body.payment_status
                        .unwrap_or_else(|| "FAILURE".to_string()),
                ),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{Value, json};
    use ui_analyzer_core::{Currency, CustomerInfo, PaidPlan};

    async fn spawn_provider() -> String {
        async fn create(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
            let auth = headers.get("authorization").and_then(|v| v.to_str().ok());
            if auth != Some("Bearer test-key") {
                return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "bad key" })));
            }
            match body["buyer"]["name"].as_str() {
                Some("Reject Me") => (
                    StatusCode::OK,
                    Json(json!({ "status": "failure", "errorMessage": "Invalid buyer" })),
                ),
                Some("Half Baked") => (StatusCode::OK, Json(json!({ "status": "success" }))),
                _ => (
                    StatusCode::OK,
                    Json(json!({
                        "status": "success",
                        "token": format!("tok_{}", body["conversationId"].as_str().unwrap_or("x")),
                        "paymentPageUrl": "https://pay.example.com/checkout"
                    })),
                ),
            }
        }

        async fn retrieve(Path(token): Path<String>) -> (StatusCode, String) {
            match token.as_str() {
                "paid" => (
                    StatusCode::OK,
                    json!({
                        "status": "success",
                        "paymentStatus": "SUCCESS",
                        "cardType": "CREDIT_CARD",
                        "cardAssociation": "MASTER_CARD",
                        "lastFourDigits": "0008"
                    })
                    .to_string(),
                ),
                "declined" => (
                    StatusCode::OK,
                    json!({ "status": "success", "paymentStatus": "FAILURE" }).to_string(),
                ),
                "unknown" => (StatusCode::NOT_FOUND, "no such session".to_string()),
                "broken" => (StatusCode::OK, "<html>".to_string()),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "boom".to_string()),
            }
        }

        let app = Router::new()
            .route("/v1/checkout/sessions", post(create))
            .route("/v1/checkout/sessions/{token}", get(retrieve));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/v1", addr)
    }

    fn checkout_request(name: &str) -> CheckoutRequest {
        CheckoutRequest {
            conversation_id: "conv-1".to_string(),
            plan: PaidPlan::Yearly,
            amount_minor: 30_000,
            currency: Currency::Try,
            buyer_id: "user-1".to_string(),
            buyer: CustomerInfo {
                name: name.to_string(),
                email: "buyer@example.com".to_string(),
                ..Default::default()
            },
            callback_url: "http://localhost:3000/payment-success?plan=yearly".to_string(),
        }
    }

    async fn gateway() -> HttpCheckoutGateway {
        let config = HttpGatewayConfig::new(spawn_provider().await, "test-key");
        HttpCheckoutGateway::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_create_checkout_session() {
        let gateway = gateway().await;
        let session = gateway
            .create_checkout_session(&checkout_request("Jane Doe"))
            .await
            .unwrap();
        assert_eq!(session.session_handle, "tok_conv-1");
        assert_eq!(session.redirect_url, "https://pay.example.com/checkout");
        assert_eq!(gateway.provider(), "iyzico");
    }

    #[tokio::test]
    async fn test_create_checkout_failures() {
        let gateway = gateway().await;
        let err = gateway
            .create_checkout_session(&checkout_request("Reject Me"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Rejected(ref m) if m == "Invalid buyer"));

        let err = gateway
            .create_checkout_session(&checkout_request("Half Baked"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Malformed(_)));

        let wrong_key = HttpCheckoutGateway::new(HttpGatewayConfig::new(
            gateway.base_url.to_string(),
            "wrong-key",
        ))
        .unwrap();
        let err = wrong_key
            .create_checkout_session(&checkout_request("Jane Doe"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_retrieve_session_result() {
        let gateway = gateway().await;

        let paid = gateway.retrieve_session_result("paid").await.unwrap();
        assert!(paid.succeeded);
        assert_eq!(paid.payment_info.card_association.as_deref(), Some("MASTER_CARD"));
        assert_eq!(paid.payment_info.last_four_digits.as_deref(), Some("0008"));

        let declined = gateway.retrieve_session_result("declined").await.unwrap();
        assert!(!declined.succeeded);
        assert_eq!(declined.payment_info.payment_status.as_deref(), Some("FAILURE"));
    }

    #[tokio::test]
    async fn test_retrieve_error_classes() {
        let gateway = gateway().await;
        assert!(matches!(
            gateway.retrieve_session_result("unknown").await,
            Err(GatewayError::Rejected(_))
        ));
        assert!(matches!(
            gateway.retrieve_session_result("broken").await,
            Err(GatewayError::Malformed(_))
        ));
        assert!(matches!(
            gateway.retrieve_session_result("explode").await,
            Err(GatewayError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_transport_failure() {
        let config = HttpGatewayConfig::new("http://127.0.0.1:9/v1", "k")
            .timeout(Duration::from_millis(500));
        let gateway = HttpCheckoutGateway::new(config).unwrap();
        let err = gateway.retrieve_session_result("paid").await.unwrap_err();
        assert!(matches!(err, GatewayError::Transport(_)));
    }
}
