//! Payments for the commerce core.
//!
//! Two flows settle an order:
//!
//! - the simple charge flow ([`PaymentService::create_payment`]), which is
//!   all-or-nothing: a decline leaves no payment row behind;
//! - the resumable generate/confirm flow ([`PaymentService::generate_payment`]
//!   then [`PaymentService::confirm_payment`]), whose INITIATED row survives a
//!   failed confirm so the customer can try again.
//!
//! Provider callbacks go through [`PaymentService::handle_webhook`], which
//! verifies the signature and deduplicates by webhook id.

pub mod credentials;
pub mod error;
pub mod gateway;
pub mod service;
pub mod signing;
pub mod webhook;

pub use credentials::CredentialStore;
pub use error::{ConfigurationError, PaymentError, ProviderError};
pub use gateway::{
    ChargeOutcome, GatewayConfig, GenerateRequest, HttpPaymentGateway, InMemoryPaymentGateway,
    PaymentGateway, UpdateRequest, VendorSession,
};
pub use service::{
    ChargeRequest, GeneratePaymentRequest, PaymentConfig, PaymentService, WebhookOutcome,
};
pub use webhook::{VerifiedWebhook, WebhookRequest, WebhookVerifier};
