use std::time::{Duration, Instant};

use async_trait::async_trait;
use common::Money;
use reqwest::{Method, StatusCode};
use serde_json::{Value, json};

use super::{ChargeOutcome, GenerateRequest, PaymentGateway, UpdateRequest, VendorSession};
use crate::credentials::CredentialStore;
use crate::error::ProviderError;

/// Connection settings for the provider API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("PAYMENT_PROVIDER_BASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty())
                .unwrap_or(defaults.base_url),
            timeout: std::env::var("PAYMENT_PROVIDER_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.uropay.me".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Signed HTTP client for the provider.
///
/// Each request carries `X-API-KEY` and a bearer token derived from the
/// current secret, read fresh from the [`CredentialStore`].
#[derive(Debug, Clone)]
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    credentials: CredentialStore,
}

impl HttpPaymentGateway {
    pub fn new(config: GatewayConfig, credentials: CredentialStore) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ProviderError::Unreachable)?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    /// Sends one request and returns the status with the decoded body.
    ///
    /// 5xx and transport failures are errors; every other status is handed
    /// back for the caller to judge. Bodies that are not JSON come back as
    /// `{"raw": <text>}`.
    #[tracing::instrument(skip(self, body))]
    async fn request(
        &self,
        method: Method,
        endpoint: &'static str,
        path: &str,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value), ProviderError> {
        let (api_key, digest) = self.credentials.request_headers()?;

        let mut request = self
            .client
            .request(method, format!("{}{path}", self.base_url))
            .header("X-API-KEY", api_key)
            .bearer_auth(digest)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.json(&body);
        }

        let started = Instant::now();
        let result = request.send().await;
        metrics::histogram!("provider_request_duration_seconds", "endpoint" => endpoint)
            .record(started.elapsed().as_secs_f64());

        let response = result.map_err(|err| {
            tracing::warn!(error = %err, "payment provider request failed");
            ProviderError::Unreachable(err)
        })?;

        let status = response.status();
        let text = response.text().await.map_err(ProviderError::Unreachable)?;
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "payment provider server error");
            return Err(ProviderError::ServerError {
                status: status.as_u16(),
            });
        }

        let body = serde_json::from_str(&text).unwrap_or_else(|_| json!({ "raw": text }));
        Ok((status, body))
    }

    /// Unwraps the `data` envelope of a successful response.
    fn expect_ok(
        endpoint: &'static str,
        (status, body): (StatusCode, Value),
    ) -> Result<Value, ProviderError> {
        if status != StatusCode::OK {
            return Err(ProviderError::Rejected {
                endpoint,
                status: status.as_u16(),
                body,
            });
        }
        Ok(body
            .get("data")
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default())))
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn charge(
        &self,
        amount: Money,
        currency: &str,
        token: &str,
    ) -> Result<ChargeOutcome, ProviderError> {
        let body = json!({
            "amount": amount.to_string(),
            "currency": currency,
            "token": token,
        });
        let (status, data) = self
            .request(Method::POST, "charge", "/charge", Some(body))
            .await?;

        if status != StatusCode::OK {
            return Err(ProviderError::Rejected {
                endpoint: "charge",
                status: status.as_u16(),
                body: data,
            });
        }
        Ok(ChargeOutcome {
            success: data.get("success").and_then(Value::as_bool).unwrap_or(false),
            reference: data
                .get("reference")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<VendorSession, ProviderError> {
        let body = serde_json::to_value(request)
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
        let response = self
            .request(Method::POST, "generate", "/order/generate", Some(body))
            .await?;
        let data = Self::expect_ok("generate", response)?;
        serde_json::from_value(data).map_err(|e| ProviderError::MalformedResponse(e.to_string()))
    }

    async fn update(&self, request: &UpdateRequest) -> Result<Value, ProviderError> {
        let body = serde_json::to_value(request)
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
        let response = self
            .request(Method::PATCH, "update", "/order/update", Some(body))
            .await?;
        Self::expect_ok("update", response)
    }

    async fn status(&self, vendor_order_handle: &str) -> Result<Value, ProviderError> {
        let path = format!("/order/status/{vendor_order_handle}");
        let response = self.request(Method::GET, "status", &path, None).await?;
        Self::expect_ok("status", response)
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::error::ConfigurationError;
    use crate::signing::secret_digest;

    fn gateway(server: &MockServer, credentials: CredentialStore) -> HttpPaymentGateway {
        HttpPaymentGateway::new(
            GatewayConfig {
                base_url: format!("{}/", server.uri()),
                timeout: Duration::from_secs(2),
            },
            credentials,
        )
        .unwrap()
    }

    fn credentials() -> CredentialStore {
        CredentialStore::new(Some("api-key".to_string()), Some("secret".to_string()))
    }

    #[tokio::test]
    async fn generate_sends_signed_request_and_reads_envelope() {
        let server = MockServer::start().await;
        let bearer = format!("Bearer {}", secret_digest("secret"));
        Mock::given(method("POST"))
            .and(path("/order/generate"))
            .and(header("X-API-KEY", "api-key"))
            .and(header("Authorization", bearer.as_str()))
            .and(body_json(json!({
                "vpa": "shop@upi",
                "vpaName": "Shop",
                "amount": 24997,
                "merchantOrderId": "ORDER-7",
                "customerName": "Alice",
                "customerEmail": "alice@example.com",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"uroPayOrderId": "uro_1", "upiString": "upi://pay?am=249.97", "qrCode": "qr"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = gateway(&server, credentials())
            .generate(&GenerateRequest {
                vpa: "shop@upi".to_string(),
                vpa_name: "Shop".to_string(),
                amount: 24997,
                merchant_order_id: "ORDER-7".to_string(),
                customer_name: "Alice".to_string(),
                customer_email: "alice@example.com".to_string(),
                transaction_note: None,
            })
            .await
            .unwrap();

        assert_eq!(session.vendor_order_handle.as_deref(), Some("uro_1"));
        assert_eq!(session.pay_string.as_deref(), Some("upi://pay?am=249.97"));
        assert_eq!(session.qr_payload.as_deref(), Some("qr"));
    }

    #[tokio::test]
    async fn rotated_secret_changes_next_bearer() {
        let server = MockServer::start().await;
        let old = format!("Bearer {}", secret_digest("secret"));
        let new = format!("Bearer {}", secret_digest("rotated"));
        Mock::given(method("GET"))
            .and(header("Authorization", old.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"orderStatus": "PENDING"}})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(header("Authorization", new.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"orderStatus": "COMPLETED"}})))
            .expect(1)
            .mount(&server)
            .await;

        let credentials = credentials();
        let gateway = gateway(&server, credentials.clone());
        assert_eq!(gateway.status("uro_1").await.unwrap()["orderStatus"], "PENDING");

        credentials.rotate_secret("rotated");
        assert_eq!(gateway.status("uro_1").await.unwrap()["orderStatus"], "COMPLETED");
    }

    #[tokio::test]
    async fn charge_distinguishes_success_decline_and_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/charge"))
            .and(body_json(json!({"amount": "249.97", "currency": "USD", "token": "tok_ok"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "reference": "ch_1"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/charge"))
            .and(body_json(json!({"amount": "249.97", "currency": "USD", "token": "tok_declined"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": false, "reference": "ch_2"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/charge"))
            .and(body_json(json!({"amount": "249.97", "currency": "USD", "token": "tok_bad"})))
            .respond_with(ResponseTemplate::new(402).set_body_string("card blocked"))
            .mount(&server)
            .await;

        let gateway = gateway(&server, credentials());
        let amount = Money::from_cents(24997);

        assert_eq!(
            gateway.charge(amount, "USD", "tok_ok").await.unwrap(),
            ChargeOutcome { success: true, reference: "ch_1".to_string() }
        );
        assert!(!gateway.charge(amount, "USD", "tok_declined").await.unwrap().success);

        let err = gateway.charge(amount, "USD", "tok_bad").await.unwrap_err();
        let ProviderError::Rejected { status, body, .. } = err else {
            panic!("expected rejection");
        };
        assert_eq!(status, 402);
        assert_eq!(body, json!({"raw": "card blocked"}));
    }

    #[tokio::test]
    async fn server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/order/update"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = gateway(&server, credentials())
            .update(&UpdateRequest {
                vendor_order_handle: "uro_1".to_string(),
                reference_number: "R1".to_string(),
                order_status: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::ServerError { status: 503 }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn timeout_is_unreachable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let gateway = HttpPaymentGateway::new(
            GatewayConfig {
                base_url: server.uri(),
                timeout: Duration::from_millis(100),
            },
            credentials(),
        )
        .unwrap();

        let err = gateway.status("uro_1").await.unwrap_err();
        assert!(matches!(err, ProviderError::Unreachable(_)));
    }

    #[tokio::test]
    async fn missing_credentials_fail_before_any_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = gateway(&server, CredentialStore::new(Some("key".to_string()), None))
            .status("uro_1")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ProviderError::Configuration(ConfigurationError::MissingCredentials)
        ));
    }
}
