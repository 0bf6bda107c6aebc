//! Payment endpoints for both settlement flows and the provider webhook.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use common::OrderId;
use domain::Payment;
use payments::webhook::{ENVIRONMENT_HEADER, SIGNATURE_HEADER, WEBHOOK_ID_HEADER};
use payments::{ChargeRequest, GeneratePaymentRequest, PaymentGateway, WebhookRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use storage::Store;

use crate::AppState;
use crate::error::ApiError;
use crate::identity::Identity;

fn default_currency() -> String {
    "INR".to_string()
}

#[derive(Deserialize)]
pub struct ChargeBody {
    pub order_id: OrderId,
    pub token: String,
    #[serde(default = "default_currency")]
    pub currency: String,
}

#[derive(Deserialize)]
pub struct GenerateBody {
    pub order_id: OrderId,
    pub vpa: String,
    pub vpa_name: String,
    pub customer_name: String,
    pub customer_email: String,
    #[serde(default)]
    pub transaction_note: Option<String>,
}

#[derive(Deserialize)]
pub struct ConfirmBody {
    pub order_id: OrderId,
    pub reference_number: String,
}

#[derive(Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
}

/// POST /payments/charge: simple flow, settles or leaves nothing behind.
#[tracing::instrument(skip(state, body), fields(user_id = %actor.user_id, order_id = %body.order_id))]
pub async fn charge<S: Store, G: PaymentGateway>(
    State(state): State<Arc<AppState<S, G>>>,
    Identity(actor): Identity,
    Json(body): Json<ChargeBody>,
) -> Result<(StatusCode, Json<Payment>), ApiError> {
    if body.token.trim().is_empty() {
        return Err(ApiError::BadRequest("token must not be blank".to_string()));
    }

    let payment = state
        .payments
        .create_payment(
            actor,
            ChargeRequest {
                order_id: body.order_id,
                provider_token: body.token,
                currency: body.currency,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(payment)))
}

/// POST /payments/generate: opens or refreshes the provider session.
#[tracing::instrument(skip(state, body), fields(user_id = %actor.user_id, order_id = %body.order_id))]
pub async fn generate<S: Store, G: PaymentGateway>(
    State(state): State<Arc<AppState<S, G>>>,
    Identity(actor): Identity,
    Json(body): Json<GenerateBody>,
) -> Result<(StatusCode, Json<Payment>), ApiError> {
    let payment = state
        .payments
        .generate_payment(
            actor,
            GeneratePaymentRequest {
                order_id: body.order_id,
                vpa: body.vpa,
                vpa_name: body.vpa_name,
                customer_name: body.customer_name,
                customer_email: body.customer_email,
                transaction_note: body.transaction_note,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(payment)))
}

/// POST /payments/confirm: settles a generated payment.
#[tracing::instrument(skip(state, body), fields(user_id = %actor.user_id, order_id = %body.order_id))]
pub async fn confirm<S: Store, G: PaymentGateway>(
    State(state): State<Arc<AppState<S, G>>>,
    Identity(actor): Identity,
    Json(body): Json<ConfirmBody>,
) -> Result<Json<Payment>, ApiError> {
    let payment = state
        .payments
        .confirm_payment(actor, body.order_id, &body.reference_number)
        .await?;
    Ok(Json(payment))
}

/// GET /payments/{order_id}/status: provider-side status, owner or admin.
#[tracing::instrument(skip(state), fields(user_id = %actor.user_id))]
pub async fn status<S: Store, G: PaymentGateway>(
    State(state): State<Arc<AppState<S, G>>>,
    Identity(actor): Identity,
    Path(order_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let status = state
        .payments
        .payment_status(actor, OrderId::new(order_id))
        .await?;
    Ok(Json(status))
}

/// POST /payments/webhook: provider callback. Redeliveries are acknowledged.
#[tracing::instrument(skip_all)]
pub async fn webhook<S: Store, G: PaymentGateway>(
    State(state): State<Arc<AppState<S, G>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    state
        .payments
        .handle_webhook(WebhookRequest {
            body: &body,
            signature: header(SIGNATURE_HEADER),
            webhook_id: header(WEBHOOK_ID_HEADER),
            environment: header(ENVIRONMENT_HEADER),
        })
        .await?;

    Ok(Json(WebhookAck { status: "ok" }))
}
