use serde_json::{Value, json};

use super::{DeliveryTarget, http_client};
use crate::error::DeliveryError;
use domain::Channel;

/// Posts order events to a fixed HTTP endpoint.
#[derive(Debug, Clone)]
pub struct WebhookAdapter {
    url: String,
    client: reqwest::Client,
}

impl WebhookAdapter {
    pub fn new(url: impl Into<String>) -> Result<Self, DeliveryError> {
        Ok(Self {
            url: url.into(),
            client: http_client()?,
        })
    }

    #[tracing::instrument(skip(self, target, payload), fields(order_id = %target.order.id))]
    pub(super) async fn send(
        &self,
        target: DeliveryTarget<'_>,
        event: &str,
        payload: &Value,
    ) -> Result<String, DeliveryError> {
        let order_id = target.order.id;
        let response = self
            .client
            .post(&self.url)
            .json(&json!({
                "event": event,
                "order_id": order_id,
                "payload": payload,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                channel: Channel::Webhook,
                status: status.as_u16(),
                body,
            });
        }
        Ok(format!("webhook:{order_id}:{event}"))
    }
}
