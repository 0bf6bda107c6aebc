//! Order placement endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use domain::Reservation;
use orders::{CreateOrderRequest, PlacedOrder};
use payments::PaymentGateway;
use serde::Deserialize;
use storage::Store;

use crate::AppState;
use crate::error::ApiError;
use crate::identity::Identity;

#[derive(Deserialize)]
pub struct CreateOrderBody {
    pub items: Vec<Reservation>,
    pub address: String,
}

/// POST /orders: place an order for the caller.
///
/// Names and prices come from the catalog; the client only picks products
/// and quantities.
#[tracing::instrument(skip(state, body), fields(user_id = %actor.user_id))]
pub async fn create<S: Store, G: PaymentGateway>(
    State(state): State<Arc<AppState<S, G>>>,
    Identity(actor): Identity,
    Json(body): Json<CreateOrderBody>,
) -> Result<(StatusCode, Json<PlacedOrder>), ApiError> {
    let items = state.catalog.resolve(&body.items).await?;
    let placed = state
        .orders
        .create_order(CreateOrderRequest {
            user_id: actor.user_id,
            items,
            address: body.address,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(placed)))
}
