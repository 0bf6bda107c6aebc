//! Order creation workflow.

use std::collections::HashSet;
use std::sync::Arc;

use common::{Money, UserId};
use domain::{NewOrder, NewOrderItem, Order, OrderItem, OrderLine, Reservation, ValidationError};
use notifications::{TaskQueue, enqueue_for_customer};
use serde::Serialize;
use storage::{Store, Transaction};

use crate::error::OrderError;
use crate::ledger::InventoryLedger;

/// A customer's request to place an order.
#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    pub user_id: UserId,
    pub items: Vec<OrderLine>,
    pub address: String,
}

/// A committed order with its items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlacedOrder {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Places orders atomically and queues the confirmation notification.
pub struct OrderCreationService<S: Store> {
    store: S,
    queue: Arc<dyn TaskQueue>,
}

impl<S: Store> OrderCreationService<S> {
    pub fn new(store: S, queue: Arc<dyn TaskQueue>) -> Self {
        Self { store, queue }
    }

    /// Validates, reserves stock, and persists the order in one transaction.
    ///
    /// Any failure leaves stock, orders, and items untouched. The
    /// `order.created` notification is queued after commit and cannot fail
    /// the call.
    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id, lines = request.items.len()))]
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<PlacedOrder, OrderError> {
        validate(&request)?;

        let mut tx = self.store.begin().await?;
        let user = tx
            .find_user(request.user_id)
            .await?
            .ok_or(ValidationError::UnknownUser {
                user_id: request.user_id,
            })?;

        let reservations: Vec<Reservation> =
            request.items.iter().map(OrderLine::reservation).collect();
        InventoryLedger::reserve(&mut tx, &reservations).await?;

        let mut order = tx
            .insert_order(NewOrder {
                user_id: user.id,
                address: request.address,
            })
            .await?;

        let mut items = Vec::with_capacity(request.items.len());
        for line in &request.items {
            items.push(tx.insert_order_item(NewOrderItem::from_line(order.id, line)).await?);
        }
        order.recalculate_total(&items);
        tx.update_order(&order).await?;
        tx.commit().await?;

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(order_id = %order.id, total = %order.total_amount, "order created");

        enqueue_for_customer(
            self.queue.as_ref(),
            &user,
            order.id,
            "order.created",
            format!("order:{}:created", order.id),
        )
        .await;

        Ok(PlacedOrder { order, items })
    }
}

fn validate(request: &CreateOrderRequest) -> Result<(), ValidationError> {
    if request.items.is_empty() {
        return Err(ValidationError::EmptyItems);
    }
    if request.address.trim().is_empty() {
        return Err(ValidationError::BlankAddress);
    }

    let mut seen = HashSet::with_capacity(request.items.len());
    for line in &request.items {
        if line.quantity == 0 {
            return Err(ValidationError::InvalidQuantity {
                product_id: line.product_id,
                quantity: line.quantity,
            });
        }
        if !seen.insert(line.product_id) {
            return Err(ValidationError::DuplicateProduct {
                product_id: line.product_id,
            });
        }
    }

    let total: Money = request.items.iter().map(OrderLine::line_total).sum();
    if total > Money::max_stored() {
        return Err(ValidationError::OrderTotalTooLarge {
            total,
            max: Money::max_stored(),
        });
    }
    Ok(())
}
