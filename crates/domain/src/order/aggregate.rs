//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, OrderItemId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, ValidationError};

use super::{OrderLine, OrderStatus};

/// Order aggregate root.
///
/// Owns its items (stored separately) and, at most, one payment.
/// `total_amount` always equals the sum of its items' line totals once
/// [`Order::recalculate_total`] has run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub total_amount: Money,
    pub address: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Fails unless the order can accept a payment.
    pub fn ensure_payable(&self) -> Result<(), ValidationError> {
        if self.status.can_pay() {
            Ok(())
        } else {
            Err(ValidationError::OrderNotPayable {
                order_id: self.id,
                status: self.status,
            })
        }
    }

    /// PENDING → PAID.
    pub fn mark_paid(&mut self) -> Result<(), DomainError> {
        if !self.status.can_pay() {
            return Err(DomainError::InvalidTransition {
                entity: "order",
                from: self.status.as_str(),
                action: "mark paid",
            });
        }
        self.status = OrderStatus::Paid;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Recomputes `total_amount` from persisted items and returns it.
    pub fn recalculate_total(&mut self, items: &[OrderItem]) -> Money {
        self.total_amount = items.iter().map(OrderItem::line_total).sum();
        self.updated_at = Utc::now();
        self.total_amount
    }
}

/// Fields supplied when inserting an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub address: String,
}

impl NewOrder {
    /// Materializes the PENDING, zero-total order the store persists.
    pub fn into_order(self, id: OrderId, now: DateTime<Utc>) -> Order {
        Order {
            id,
            user_id: self.user_id,
            status: OrderStatus::Pending,
            total_amount: Money::zero(),
            address: self.address,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A persisted order line with its immutable catalog snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub product_name: String,
    pub price: Money,
    pub quantity: u32,
}

impl OrderItem {
    /// Returns the total price for this item (quantity * price).
    pub fn line_total(&self) -> Money {
        self.price.multiply(self.quantity)
    }
}

/// Fields supplied when inserting an order item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub product_name: String,
    pub price: Money,
    pub quantity: u32,
}

impl NewOrderItem {
    /// Builds the item row for `line` on `order_id`.
    pub fn from_line(order_id: OrderId, line: &OrderLine) -> Self {
        Self {
            order_id,
            product_id: line.product_id,
            product_name: line.product_name.clone(),
            price: line.price,
            quantity: line.quantity,
        }
    }

    pub fn into_item(self, id: OrderItemId) -> OrderItem {
        OrderItem {
            id,
            order_id: self.order_id,
            product_id: self.product_id,
            product_name: self.product_name,
            price: self.price,
            quantity: self.quantity,
        }
    }
}
