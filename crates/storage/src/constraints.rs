//! Names of the uniqueness constraints, shared by both stores so callers can
//! tell which invariant a [`StorageError::UniqueViolation`](crate::StorageError)
//! refers to.

pub const UNIQUE_ORDER_PRODUCT: &str = "unique_order_product";
pub const UNIQUE_PAYMENT_PER_ORDER: &str = "unique_payment_per_order";
pub const UNIQUE_WEBHOOK_ID: &str = "unique_webhook_id";
pub const UNIQUE_NOTIFICATION_PER_CHANNEL: &str = "unique_notification_per_channel";
