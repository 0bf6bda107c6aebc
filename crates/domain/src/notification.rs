//! Notification rows and channel identifiers.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use common::{NotificationId, OrderId, TaskId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A delivery channel. Names match exactly, uppercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    Email,
    Sms,
    Webhook,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Email, Channel::Sms, Channel::Webhook];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "EMAIL",
            Channel::Sms => "SMS",
            Channel::Webhook => "WEBHOOK",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .into_iter()
            .find(|channel| channel.as_str() == s)
            .ok_or_else(|| format!("unknown channel: {s}"))
    }
}

/// Delivery status of a single notification row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    #[default]
    Pending,
    Sent,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "PENDING",
            NotificationStatus::Sent => "SENT",
            NotificationStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for NotificationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(NotificationStatus::Pending),
            "SENT" => Ok(NotificationStatus::Sent),
            "FAILED" => Ok(NotificationStatus::Failed),
            other => Err(format!("unknown notification status: {other}")),
        }
    }
}

/// Per-channel idempotency key. `None` when the job carries no unique key,
/// in which case every dispatch creates a fresh row.
pub fn idempotency_key(unique_key: Option<&str>, channel: Channel) -> Option<String> {
    unique_key.map(|key| format!("{key}:{channel}"))
}

/// One delivery of one event to one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub order_id: OrderId,
    pub unique_key: Option<String>,
    pub channel: Channel,
    pub status: NotificationStatus,
    pub payload: Value,
    pub error_message: Option<String>,
    pub attempts: u32,
    pub task_id: Option<TaskId>,
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn is_sent(&self) -> bool {
        self.status == NotificationStatus::Sent
    }

    /// Counts a delivery attempt made by `task_id`.
    pub fn record_attempt(&mut self, task_id: TaskId) {
        self.attempts += 1;
        self.task_id = Some(task_id);
    }

    pub fn mark_sent(&mut self, external_id: String) {
        self.status = NotificationStatus::Sent;
        self.sent_at = Some(Utc::now());
        self.external_id = Some(external_id);
        self.error_message = None;
    }

    /// Stores the error of a failed attempt; the row stays retryable.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.error_message = Some(error.into());
    }

    /// Retries are exhausted.
    pub fn mark_failed(&mut self) {
        self.status = NotificationStatus::Failed;
    }
}

/// Fields supplied when inserting a notification.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub order_id: OrderId,
    pub unique_key: Option<String>,
    pub channel: Channel,
    pub payload: Value,
}

impl NewNotification {
    pub fn into_notification(self, id: NotificationId, now: DateTime<Utc>) -> Notification {
        Notification {
            id,
            order_id: self.order_id,
            unique_key: self.unique_key,
            channel: self.channel,
            status: NotificationStatus::Pending,
            payload: self.payload,
            error_message: None,
            attempts: 0,
            task_id: None,
            external_id: None,
            created_at: now,
            sent_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn channel_parses_known_names_only() {
        assert_eq!("EMAIL".parse::<Channel>().unwrap(), Channel::Email);
        assert_eq!("SMS".parse::<Channel>().unwrap(), Channel::Sms);
        assert_eq!("WEBHOOK".parse::<Channel>().unwrap(), Channel::Webhook);
        assert!("UNKNOWN".parse::<Channel>().is_err());
        assert!("sms".parse::<Channel>().is_err());
        assert!("Email".parse::<Channel>().is_err());
    }

    #[test]
    fn idempotency_key_is_scoped_per_channel() {
        assert_eq!(
            idempotency_key(Some("order:1:created"), Channel::Email).as_deref(),
            Some("order:1:created:EMAIL")
        );
        assert_eq!(idempotency_key(None, Channel::Sms), None);
    }

    #[test]
    fn attempt_lifecycle() {
        let mut notification = NewNotification {
            order_id: OrderId::new(1),
            unique_key: Some("order:1:created".to_string()),
            channel: Channel::Email,
            payload: json!({"event": "order.created", "order_id": 1}),
        }
        .into_notification(NotificationId::new(1), Utc::now());

        let task = TaskId::new();
        notification.record_attempt(task);
        notification.record_failure("smtp down");
        assert_eq!(notification.attempts, 1);
        assert_eq!(notification.status, NotificationStatus::Pending);
        assert_eq!(notification.error_message.as_deref(), Some("smtp down"));

        notification.record_attempt(task);
        notification.mark_sent("email:1:order.created".to_string());
        assert_eq!(notification.attempts, 2);
        assert_eq!(notification.task_id, Some(task));
        assert!(notification.is_sent());
        assert!(notification.sent_at.is_some());
        assert!(notification.error_message.is_none());
    }
}
