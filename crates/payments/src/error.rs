use std::time::Duration;

use domain::{DomainError, PermissionError, ValidationError};
use serde_json::Value;
use storage::StorageError;
use thiserror::Error;

/// A required provider setting is missing or unusable. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("Payment provider API key/secret not configured")]
    MissingCredentials,

    #[error("Webhook secret not configured")]
    MissingWebhookSecret,

    #[error("Invalid payment provider setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Failures talking to the payment provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport failure, including timeouts.
    #[error("Payment provider unreachable")]
    Unreachable(#[source] reqwest::Error),

    #[error("Provider server error: {status}")]
    ServerError { status: u16 },

    /// A non-5xx response the endpoint does not accept as success.
    #[error("Provider rejected {endpoint} request with status {status}")]
    Rejected {
        endpoint: &'static str,
        status: u16,
        body: Value,
    },

    /// The provider answered but refused the charge.
    #[error("Payment declined by provider")]
    Declined { reference: Option<String> },

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

impl ProviderError {
    /// True when repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Unreachable(_) | ProviderError::ServerError { .. }
        )
    }
}

/// Errors from payment workflows.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Provider(ProviderError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Payment operation timed out after {0:?}")]
    Timeout(Duration),
}

impl From<ValidationError> for PaymentError {
    fn from(err: ValidationError) -> Self {
        PaymentError::Domain(err.into())
    }
}

impl From<PermissionError> for PaymentError {
    fn from(err: PermissionError) -> Self {
        PaymentError::Domain(err.into())
    }
}

impl From<ProviderError> for PaymentError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Configuration(err) => PaymentError::Configuration(err),
            other => PaymentError::Provider(other),
        }
    }
}

impl PaymentError {
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            PaymentError::Domain(DomainError::Validation(err)) => Some(err),
            _ => None,
        }
    }
}
