//! Shared types for the commerce core.

pub mod money;
pub mod types;

pub use money::Money;
pub use types::{
    NotificationId, OrderId, OrderItemId, PaymentId, ProductId, TaskId, UserId, WebhookEventId,
};
