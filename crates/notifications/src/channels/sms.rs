use serde::Deserialize;

use super::{ChannelConfig, DeliveryTarget, http_client};
use crate::error::DeliveryError;
use domain::Channel;

/// SMS backend.
#[derive(Debug, Clone)]
pub enum SmsProvider {
    /// Logs the message and returns a synthetic id.
    Stub,
    Twilio {
        base_url: String,
        account_sid: String,
        auth_token: String,
        from: String,
    },
}

impl SmsProvider {
    pub fn from_config(config: &ChannelConfig) -> Result<Self, DeliveryError> {
        match config.sms_provider.to_ascii_lowercase().as_str() {
            "" | "stub" => Ok(SmsProvider::Stub),
            "twilio" => {
                let required = |value: &Option<String>, key: &str| {
                    value
                        .clone()
                        .ok_or_else(|| DeliveryError::Configuration(format!("{key} is required for twilio")))
                };
                Ok(SmsProvider::Twilio {
                    base_url: config.twilio_base_url.trim_end_matches('/').to_string(),
                    account_sid: required(&config.twilio_account_sid, "TWILIO_ACCOUNT_SID")?,
                    auth_token: required(&config.twilio_auth_token, "TWILIO_AUTH_TOKEN")?,
                    from: required(&config.twilio_from, "TWILIO_FROM")?,
                })
            }
            other => Err(DeliveryError::Configuration(format!("Unknown SMS provider: {other}"))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TwilioMessage {
    sid: String,
}

/// Sends a one-line order update to the customer's phone.
#[derive(Debug, Clone)]
pub struct SmsAdapter {
    provider: SmsProvider,
    client: reqwest::Client,
}

impl SmsAdapter {
    pub fn new(provider: SmsProvider) -> Result<Self, DeliveryError> {
        Ok(Self {
            provider,
            client: http_client()?,
        })
    }

    #[tracing::instrument(skip(self, target), fields(order_id = %target.order.id))]
    pub(super) async fn send(
        &self,
        target: DeliveryTarget<'_>,
        event: &str,
    ) -> Result<String, DeliveryError> {
        let order_id = target.order.id;
        let phone = target
            .customer
            .and_then(|user| user.phone_number.as_deref())
            .map(str::trim)
            .filter(|phone| !phone.is_empty())
            .ok_or(DeliveryError::MissingPhone { order_id })?;
        let body = format!("[{event}] Order {order_id}");

        match &self.provider {
            SmsProvider::Stub => {
                tracing::info!(message = %body, "sms delivered to stub");
                Ok(format!("sms:stub:{order_id}:{event}"))
            }
            SmsProvider::Twilio {
                base_url,
                account_sid,
                auth_token,
                from,
            } => {
                let url = format!("{base_url}/2010-04-01/Accounts/{account_sid}/Messages.json");
                let response = self
                    .client
                    .post(url)
                    .basic_auth(account_sid, Some(auth_token))
                    .form(&[("To", phone), ("From", from.as_str()), ("Body", body.as_str())])
                    .send()
                    .await?;

                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(DeliveryError::Rejected {
                        channel: Channel::Sms,
                        status: status.as_u16(),
                        body,
                    });
                }
                let message: TwilioMessage = response.json().await?;
                Ok(message.sid)
            }
        }
    }
}
