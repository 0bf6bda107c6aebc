//! Domain error types.

use common::{Money, OrderId, ProductId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::order::OrderStatus;

/// One line of an order that cannot be satisfied from current stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortfall {
    pub product_id: ProductId,
    pub product_name: String,
    pub requested: u32,
    pub available: u32,
}

/// Caller-correctable input or business-rule violations.
///
/// Serializes with a `code` tag plus the field detail, which is what HTTP
/// callers receive verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ValidationError {
    /// No items were supplied.
    #[error("Order must contain at least one item")]
    EmptyItems,

    /// Address is empty or whitespace.
    #[error("Address must not be blank")]
    BlankAddress,

    /// A line asked for zero units.
    #[error("Invalid quantity {quantity} for product {product_id} (must be at least 1)")]
    InvalidQuantity { product_id: ProductId, quantity: u32 },

    /// The same product appears on more than one line.
    #[error("Product {product_id} is listed more than once")]
    DuplicateProduct { product_id: ProductId },

    /// The order total is larger than an order can store.
    #[error("Order total {total} exceeds the maximum of {max}")]
    OrderTotalTooLarge { total: Money, max: Money },

    /// The acting user does not exist.
    #[error("Unknown user: {user_id}")]
    UnknownUser { user_id: UserId },

    /// One or more requested products do not exist.
    #[error("Products not found: {}", join_ids(.invalid_product_ids))]
    ProductNotFound { invalid_product_ids: Vec<ProductId> },

    /// One or more lines exceed available stock.
    #[error("Insufficient inventory for {} product(s)", .insufficient_inventory.len())]
    InsufficientInventory { insufficient_inventory: Vec<Shortfall> },

    /// The order does not exist.
    #[error("Order does not exist: {order_id}")]
    OrderNotFound { order_id: OrderId },

    /// The order cannot be paid in its current status.
    #[error("Order {order_id} cannot be paid in status {status}")]
    OrderNotPayable { order_id: OrderId, status: OrderStatus },

    /// Confirmation was attempted before the payment was generated.
    #[error("Payment has not been initiated for order {order_id}")]
    PaymentNotInitiated { order_id: OrderId },

    /// The simple flow found an existing payment for the order.
    #[error("Order {order_id} already has a payment")]
    PaymentAlreadyExists { order_id: OrderId },

    /// Webhook body is not a JSON object.
    #[error("Invalid webhook payload: {reason}")]
    InvalidWebhookPayload { reason: String },

    /// Webhook arrived without an id header.
    #[error("Missing webhook id")]
    MissingWebhookId,

    /// A single request field is malformed.
    #[error("Invalid {field}: {reason}")]
    InvalidField { field: String, reason: String },
}

fn join_ids(ids: &[ProductId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// The actor is not entitled to the operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermissionError {
    #[error("User {user_id} does not have permission to act on order {order_id}")]
    NotOrderOwner { user_id: UserId, order_id: OrderId },
}

/// Errors that can occur during domain operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Permission(#[from] PermissionError),

    /// A status transition was requested from a state that does not allow it.
    #[error("Invalid {entity} transition: cannot {action} from {from} state")]
    InvalidTransition {
        entity: &'static str,
        from: &'static str,
        action: &'static str,
    },
}
