use chrono::{DateTime, Utc};
use common::WebhookEventId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A processed provider callback. Rows are never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: WebhookEventId,
    pub webhook_id: String,
    pub payload: Value,
    pub received_at: DateTime<Utc>,
}

/// Fields supplied when appending to the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct NewWebhookEvent {
    pub webhook_id: String,
    pub payload: Value,
}

impl NewWebhookEvent {
    pub fn into_event(self, id: WebhookEventId, received_at: DateTime<Utc>) -> WebhookEvent {
        WebhookEvent {
            id,
            webhook_id: self.webhook_id,
            payload: self.payload,
            received_at,
        }
    }
}
