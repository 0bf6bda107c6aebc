//! Payments and the inbound webhook ledger.

mod aggregate;
mod state;
mod webhook_event;

pub use aggregate::{NewPayment, Payment};

/// Longest reference number a payment row stores.
pub const REFERENCE_NUMBER_MAX_LEN: usize = 64;

/// Longest webhook id the dedup ledger stores.
pub const WEBHOOK_ID_MAX_LEN: usize = 255;
pub use state::PaymentStatus;
pub use webhook_event::{NewWebhookEvent, WebhookEvent};
