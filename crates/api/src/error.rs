//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{DomainError, ValidationError};
use orders::OrderError;
use payments::{PaymentError, ProviderError};
use storage::StorageError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// No usable identity on the request.
    Unauthorized(String),
    /// Malformed request from the client.
    BadRequest(String),
    /// Business-rule violation, returned with its structured detail.
    Validation(ValidationError),
    /// The actor may not touch the resource.
    Forbidden(String),
    /// The resource is not in a state that allows the operation.
    Conflict(String),
    /// The provider declined the charge.
    Declined,
    /// The provider failed; details stay in the logs.
    Provider(String),
    /// The operation ran out of time.
    Timeout,
    /// Internal server error; details stay in the logs.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, error_body(msg)),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, error_body(msg)),
            ApiError::Validation(err) => {
                let status = if is_conflict(&err) {
                    StatusCode::CONFLICT
                } else {
                    StatusCode::BAD_REQUEST
                };
                let body = serde_json::json!({
                    "error": err.to_string(),
                    "detail": err,
                });
                (status, body)
            }
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, error_body(msg)),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, error_body(msg)),
            ApiError::Declined => (
                StatusCode::PAYMENT_REQUIRED,
                error_body("Payment was declined".to_string()),
            ),
            ApiError::Provider(msg) => {
                tracing::warn!(error = %msg, "payment provider failure");
                (
                    StatusCode::BAD_GATEWAY,
                    error_body("Payment provider request failed".to_string()),
                )
            }
            ApiError::Timeout => (
                StatusCode::GATEWAY_TIMEOUT,
                error_body("Operation timed out".to_string()),
            ),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_body("Internal server error".to_string()),
                )
            }
        };

        (status, axum::Json(body)).into_response()
    }
}

fn error_body(message: String) -> serde_json::Value {
    serde_json::json!({ "error": message })
}

fn is_conflict(err: &ValidationError) -> bool {
    matches!(
        err,
        ValidationError::OrderNotPayable { .. } | ValidationError::PaymentAlreadyExists { .. }
    )
}

fn domain_error_to_api(err: DomainError) -> ApiError {
    match err {
        DomainError::Validation(err) => ApiError::Validation(err),
        DomainError::Permission(err) => ApiError::Forbidden(err.to_string()),
        err @ DomainError::InvalidTransition { .. } => ApiError::Conflict(err.to_string()),
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::UniqueViolation { .. } => {
                ApiError::Conflict("Request conflicts with a concurrent change".to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::Domain(err) => domain_error_to_api(err),
            OrderError::Storage(err) => err.into(),
        }
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Domain(err) => domain_error_to_api(err),
            PaymentError::Storage(err) => err.into(),
            PaymentError::Provider(ProviderError::Declined { .. }) => ApiError::Declined,
            PaymentError::Provider(err) => ApiError::Provider(err.to_string()),
            PaymentError::Configuration(err) => ApiError::Internal(err.to_string()),
            PaymentError::InvalidSignature => {
                ApiError::Unauthorized("Invalid webhook signature".to_string())
            }
            PaymentError::Timeout(_) => ApiError::Timeout,
        }
    }
}
