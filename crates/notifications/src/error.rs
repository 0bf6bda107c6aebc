//! Notification error types.

use common::OrderId;
use domain::Channel;
use storage::StorageError;
use thiserror::Error;

/// A channel failed to deliver a message.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("No email recipient for order {order_id}")]
    MissingEmail { order_id: OrderId },

    #[error("No phone number for order {order_id}")]
    MissingPhone { order_id: OrderId },

    #[error("Invalid address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build email: {0}")]
    Message(String),

    #[error("SMTP error: {0}")]
    Smtp(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The downstream gateway answered with a non-success status.
    #[error("{channel} gateway rejected the message with status {status}: {body}")]
    Rejected {
        channel: Channel,
        status: u16,
        body: String,
    },

    /// The channel is temporarily unable to send.
    #[error("Channel unavailable: {0}")]
    Unavailable(String),

    /// The channel is misconfigured.
    #[error("Channel configuration error: {0}")]
    Configuration(String),
}

/// Errors from the task queue.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Queue unavailable: {0}")]
    Unavailable(String),
}

/// Errors that abort a dispatch attempt as a whole.
///
/// Channel delivery failures are not here: they are recorded on the
/// notification row and retried.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
