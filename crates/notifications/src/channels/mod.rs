//! Delivery channels.
//!
//! Each channel is a variant of [`ChannelAdapter`]; the [`ChannelRegistry`]
//! holds the adapters configured for this process.

mod email;
mod sms;
mod webhook;

use std::collections::HashMap;
use std::time::Duration;

use domain::{Channel, Order, User};
use serde_json::Value;

use crate::error::DeliveryError;

pub use email::{EmailAdapter, MailTransport, Outbox, OutgoingEmail};
pub use sms::{SmsAdapter, SmsProvider};
pub use webhook::WebhookAdapter;

/// Timeout applied to every outbound HTTP call a channel makes.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// What a channel is delivering about.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryTarget<'a> {
    pub order: &'a Order,
    /// The order's owner, if the account still exists.
    pub customer: Option<&'a User>,
}

/// A configured delivery channel.
#[derive(Debug, Clone)]
pub enum ChannelAdapter {
    Email(EmailAdapter),
    Sms(SmsAdapter),
    Webhook(WebhookAdapter),
}

impl ChannelAdapter {
    pub fn channel(&self) -> Channel {
        match self {
            ChannelAdapter::Email(_) => Channel::Email,
            ChannelAdapter::Sms(_) => Channel::Sms,
            ChannelAdapter::Webhook(_) => Channel::Webhook,
        }
    }

    /// Delivers `event` for the target order and returns the external id
    /// the downstream system assigned.
    pub async fn send(
        &self,
        target: DeliveryTarget<'_>,
        event: &str,
        payload: &Value,
    ) -> Result<String, DeliveryError> {
        match self {
            ChannelAdapter::Email(adapter) => adapter.send(target, event).await,
            ChannelAdapter::Sms(adapter) => adapter.send(target, event).await,
            ChannelAdapter::Webhook(adapter) => adapter.send(target, event, payload).await,
        }
    }
}

impl From<EmailAdapter> for ChannelAdapter {
    fn from(adapter: EmailAdapter) -> Self {
        ChannelAdapter::Email(adapter)
    }
}

impl From<SmsAdapter> for ChannelAdapter {
    fn from(adapter: SmsAdapter) -> Self {
        ChannelAdapter::Sms(adapter)
    }
}

impl From<WebhookAdapter> for ChannelAdapter {
    fn from(adapter: WebhookAdapter) -> Self {
        ChannelAdapter::Webhook(adapter)
    }
}

/// The adapters available to the dispatcher, at most one per channel.
#[derive(Debug, Clone, Default)]
pub struct ChannelRegistry {
    adapters: HashMap<Channel, ChannelAdapter>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter, replacing any previous one for the same channel.
    pub fn with(mut self, adapter: impl Into<ChannelAdapter>) -> Self {
        let adapter = adapter.into();
        self.adapters.insert(adapter.channel(), adapter);
        self
    }

    pub fn get(&self, channel: Channel) -> Option<&ChannelAdapter> {
        self.adapters.get(&channel)
    }

    /// Builds the registry described by `config`.
    ///
    /// Email and SMS are always present (falling back to log-only delivery);
    /// the webhook channel only exists when a target URL is configured.
    pub fn from_config(config: &ChannelConfig) -> Result<Self, DeliveryError> {
        let transport = match &config.smtp_host {
            Some(host) => MailTransport::smtp(
                host,
                config.smtp_port,
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            )?,
            None => MailTransport::Log,
        };
        let mut registry = Self::new()
            .with(EmailAdapter::new(&config.email_from, transport)?)
            .with(SmsAdapter::new(SmsProvider::from_config(config)?)?);

        if let Some(url) = &config.webhook_url {
            registry = registry.with(WebhookAdapter::new(url.clone())?);
        }
        Ok(registry)
    }
}

/// Channel settings read from the environment.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub email_from: String,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    /// Empty selects the stub provider.
    pub sms_provider: String,
    pub twilio_account_sid: Option<String>,
    pub twilio_auth_token: Option<String>,
    pub twilio_from: Option<String>,
    pub twilio_base_url: String,
    pub webhook_url: Option<String>,
}

impl ChannelConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let var = |key: &str| std::env::var(key).ok().filter(|value| !value.is_empty());

        Self {
            email_from: var("EMAIL_FROM").unwrap_or(defaults.email_from),
            smtp_host: var("SMTP_HOST"),
            smtp_port: var("SMTP_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.smtp_port),
            smtp_username: var("SMTP_USERNAME"),
            smtp_password: var("SMTP_PASSWORD"),
            sms_provider: var("SMS_PROVIDER").unwrap_or_default(),
            twilio_account_sid: var("TWILIO_ACCOUNT_SID"),
            twilio_auth_token: var("TWILIO_AUTH_TOKEN"),
            twilio_from: var("TWILIO_FROM"),
            twilio_base_url: var("TWILIO_BASE_URL").unwrap_or(defaults.twilio_base_url),
            webhook_url: var("NOTIFY_WEBHOOK_URL"),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            email_from: "orders@example.com".to_string(),
            smtp_host: None,
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
            sms_provider: String::new(),
            twilio_account_sid: None,
            twilio_auth_token: None,
            twilio_from: None,
            twilio_base_url: "https://api.twilio.com".to_string(),
            webhook_url: None,
        }
    }
}

fn http_client() -> Result<reqwest::Client, DeliveryError> {
    Ok(reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_email_and_sms_only() {
        let registry = ChannelRegistry::from_config(&ChannelConfig::default()).unwrap();
        assert!(registry.get(Channel::Email).is_some());
        assert!(registry.get(Channel::Sms).is_some());
        assert!(registry.get(Channel::Webhook).is_none());
    }

    #[test]
    fn webhook_url_enables_webhook_channel() {
        let config = ChannelConfig {
            webhook_url: Some("http://localhost:9/hook".to_string()),
            ..Default::default()
        };
        let registry = ChannelRegistry::from_config(&config).unwrap();
        assert_eq!(
            registry.get(Channel::Webhook).map(ChannelAdapter::channel),
            Some(Channel::Webhook)
        );
    }

    #[test]
    fn unknown_sms_provider_is_rejected() {
        let config = ChannelConfig {
            sms_provider: "carrier-pigeon".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            ChannelRegistry::from_config(&config),
            Err(DeliveryError::Configuration(_))
        ));
    }

    #[test]
    fn later_registration_replaces_earlier() {
        let outbox = Outbox::new();
        let registry = ChannelRegistry::new()
            .with(EmailAdapter::new("a@example.com", MailTransport::Log).unwrap())
            .with(EmailAdapter::new("b@example.com", MailTransport::Outbox(outbox)).unwrap());
        let Some(ChannelAdapter::Email(adapter)) = registry.get(Channel::Email) else {
            panic!("email adapter missing");
        };
        assert!(matches!(adapter.transport(), MailTransport::Outbox(_)));
    }
}
