//! Payment provider API.

mod http;
mod memory;

use async_trait::async_trait;
use common::Money;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;

pub use http::{GatewayConfig, HttpPaymentGateway};
pub use memory::InMemoryPaymentGateway;

/// Result of a simple charge the provider answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeOutcome {
    pub success: bool,
    pub reference: String,
}

/// Body of `POST /order/generate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub vpa: String,
    pub vpa_name: String,
    /// Minor units.
    pub amount: i64,
    pub merchant_order_id: String,
    pub customer_name: String,
    pub customer_email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_note: Option<String>,
}

/// What `generate` returns for the customer to pay with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct VendorSession {
    #[serde(rename = "uroPayOrderId")]
    pub vendor_order_handle: Option<String>,
    #[serde(rename = "upiString")]
    pub pay_string: Option<String>,
    #[serde(rename = "qrCode")]
    pub qr_payload: Option<String>,
}

/// Body of `PATCH /order/update`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateRequest {
    #[serde(rename = "uroPayOrderId")]
    pub vendor_order_handle: String,
    #[serde(rename = "referenceNumber")]
    pub reference_number: String,
    #[serde(rename = "orderStatus", skip_serializing_if = "Option::is_none")]
    pub order_status: Option<String>,
}

/// The settlement partner.
#[async_trait]
pub trait PaymentGateway: Send + Sync + 'static {
    /// Charges a tokenized instrument in one call.
    async fn charge(
        &self,
        amount: Money,
        currency: &str,
        token: &str,
    ) -> Result<ChargeOutcome, ProviderError>;

    /// Opens a provider-side order the customer can pay.
    async fn generate(&self, request: &GenerateRequest) -> Result<VendorSession, ProviderError>;

    /// Reports the customer's payment reference for a provider order.
    async fn update(&self, request: &UpdateRequest) -> Result<Value, ProviderError>;

    /// Provider-side state of an order.
    async fn status(&self, vendor_order_handle: &str) -> Result<Value, ProviderError>;
}
