//! Inbound provider callback verification.

use serde_json::{Map, Value};

use crate::credentials::CredentialStore;
use crate::error::PaymentError;
use crate::signing::{signing_payload, verify};
use domain::{REFERENCE_NUMBER_MAX_LEN, ValidationError, WEBHOOK_ID_MAX_LEN};

pub const SIGNATURE_HEADER: &str = "x-uropay-signature";
pub const WEBHOOK_ID_HEADER: &str = "x-uropay-webhook-id";
pub const ENVIRONMENT_HEADER: &str = "x-uropay-environment";

/// A raw callback as received.
#[derive(Debug, Clone, Copy)]
pub struct WebhookRequest<'a> {
    pub body: &'a [u8],
    pub signature: Option<&'a str>,
    pub webhook_id: Option<&'a str>,
    pub environment: Option<&'a str>,
}

/// A callback whose signature checked out.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedWebhook {
    pub webhook_id: String,
    pub payload: Map<String, Value>,
}

impl VerifiedWebhook {
    fn text(&self, key: &str) -> Option<&str> {
        self.payload
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }

    /// The customer's payment reference, if the provider sent one.
    pub fn reference_number(&self) -> Option<&str> {
        self.text("referenceNumber")
    }

    /// The provider's own order id.
    pub fn vendor_order_handle(&self) -> Option<&str> {
        self.text("uroPayOrderId")
    }
}

/// Checks webhook signatures against the current provider secret.
#[derive(Debug, Clone)]
pub struct WebhookVerifier {
    credentials: CredentialStore,
}

impl WebhookVerifier {
    pub fn new(credentials: CredentialStore) -> Self {
        Self { credentials }
    }

    pub fn verify(&self, request: WebhookRequest<'_>) -> Result<VerifiedWebhook, PaymentError> {
        let payload = match serde_json::from_slice::<Value>(request.body) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                return Err(ValidationError::InvalidWebhookPayload {
                    reason: "expected a JSON object".to_string(),
                }
                .into());
            }
            Err(err) => {
                return Err(ValidationError::InvalidWebhookPayload {
                    reason: err.to_string(),
                }
                .into());
            }
        };

        let digest = self.credentials.webhook_digest()?;
        let canonical = signing_payload(&payload, request.environment);
        let valid = request
            .signature
            .is_some_and(|signature| verify(&digest, &canonical, signature));
        if !valid {
            tracing::warn!(webhook_id = ?request.webhook_id, "webhook signature rejected");
            return Err(PaymentError::InvalidSignature);
        }

        let webhook_id = request
            .webhook_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(ValidationError::MissingWebhookId)?;
        if webhook_id.chars().count() > WEBHOOK_ID_MAX_LEN {
            return Err(ValidationError::InvalidField {
                field: "webhookId".to_string(),
                reason: format!("must be at most {WEBHOOK_ID_MAX_LEN} characters"),
            }
            .into());
        }

        let verified = VerifiedWebhook {
            webhook_id: webhook_id.to_string(),
            payload,
        };
        if verified
            .reference_number()
            .is_some_and(|reference| reference.chars().count() > REFERENCE_NUMBER_MAX_LEN)
        {
            return Err(ValidationError::InvalidWebhookPayload {
                reason: format!("referenceNumber must be at most {REFERENCE_NUMBER_MAX_LEN} characters"),
            }
            .into());
        }
        Ok(verified)
    }
}
