//! Domain layer for the commerce core.
//!
//! This crate provides the entities shared by every workflow:
//! - Users and the acting identity
//! - Orders, order items, and the inventory reservation planner
//! - Payments and the inbound webhook ledger
//! - Notifications with per-channel idempotency keys
//!
//! Everything here is pure: persistence lives in `storage`, workflows in
//! `orders`, `payments`, and `notifications`.

pub mod error;
pub mod notification;
pub mod order;
pub mod payment;
pub mod user;

pub use error::{DomainError, PermissionError, Shortfall, ValidationError};
pub use notification::{
    Channel, NewNotification, Notification, NotificationStatus, idempotency_key,
};
pub use order::{
    NewOrder, NewOrderItem, Order, OrderItem, OrderLine, OrderStatus, Product, Reservation,
    StockChange, plan_reservation,
};
pub use payment::{
    NewPayment, NewWebhookEvent, Payment, PaymentStatus, REFERENCE_NUMBER_MAX_LEN,
    WEBHOOK_ID_MAX_LEN, WebhookEvent,
};
pub use user::{Actor, User};
