//! Per-channel idempotent notification delivery.

use std::time::Duration;

use common::TaskId;
use domain::{Channel, NewNotification, Notification, idempotency_key};
use serde_json::{Value, json};
use storage::{StorageError, Store, Transaction, constraints};

use crate::channels::{ChannelRegistry, DeliveryTarget};
use crate::error::DispatchError;
use crate::queue::{ClaimedTask, DispatchJob};

/// Retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Retries after the first attempt before a channel is marked FAILED.
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl DispatchConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_retries: std::env::var("NOTIFY_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_retries),
            retry_delay: std::env::var("NOTIFY_RETRY_DELAY_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.retry_delay),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_delay: Duration::from_secs(60),
        }
    }
}

/// What the queue should do with a task after one dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Every channel is sent or skipped.
    Completed,
    /// At least one channel failed; run the whole job again after `delay`.
    Retry { delay: Duration },
    /// Retries are used up; failed channels are now FAILED.
    Exhausted,
}

/// Delivers one job to each of its channels.
pub struct NotificationDispatcher<S: Store> {
    store: S,
    channels: ChannelRegistry,
    config: DispatchConfig,
}

impl<S: Store> NotificationDispatcher<S> {
    pub fn new(store: S, channels: ChannelRegistry, config: DispatchConfig) -> Self {
        Self {
            store,
            channels,
            config,
        }
    }

    pub fn config(&self) -> DispatchConfig {
        self.config
    }

    /// Runs a job once, outside the queue, as a first delivery.
    pub async fn dispatch_notification(
        &self,
        job: DispatchJob,
    ) -> Result<DispatchOutcome, DispatchError> {
        let task = ClaimedTask {
            id: TaskId::new(),
            job,
            retries: 0,
        };
        self.dispatch(&task).await
    }

    /// Processes every channel of a claimed task.
    ///
    /// Channels already SENT under the same key are skipped, so running the
    /// whole channel list again on retry only resends what failed.
    #[tracing::instrument(
        skip(self, task),
        fields(task_id = %task.id, order_id = %task.job.order_id, event = %task.job.event, retries = task.retries)
    )]
    pub async fn dispatch(&self, task: &ClaimedTask) -> Result<DispatchOutcome, DispatchError> {
        let job = &task.job;

        let mut tx = self.store.begin().await?;
        let Some(order) = tx.find_order(job.order_id).await? else {
            tracing::error!("order not found, dropping notification job");
            return Ok(DispatchOutcome::Completed);
        };
        let customer = tx.find_user(order.user_id).await?;
        drop(tx);

        let target = DeliveryTarget {
            order: &order,
            customer: customer.as_ref(),
        };
        let payload = json!({ "event": job.event, "order_id": job.order_id });
        let mut failed = Vec::new();

        for name in &job.channels {
            let Ok(channel) = name.parse::<Channel>() else {
                tracing::warn!(channel = %name, "unknown notification channel, skipping");
                continue;
            };
            let Some(adapter) = self.channels.get(channel) else {
                tracing::warn!(%channel, "no adapter configured for channel, skipping");
                continue;
            };

            let row = self.notification_row(job, channel, &payload).await?;

            // The row lock is held across the provider call: a second worker
            // on the same key waits here and then finds the row SENT.
            let mut tx = self.store.begin().await?;
            let Some(mut notification) = tx.lock_notification(row.id).await? else {
                return Err(StorageError::RowNotFound {
                    table: "notifications",
                    id: row.id.get(),
                }
                .into());
            };
            if notification.is_sent() {
                tracing::info!(notification_id = %notification.id, %channel, "already sent");
                continue;
            }

            notification.record_attempt(task.id);

            match adapter.send(target, &job.event, &notification.payload).await {
                Ok(external_id) => {
                    notification.mark_sent(external_id);
                    if let Err(err) = persist(tx, &notification).await {
                        tracing::error!(
                            notification_id = %notification.id,
                            %channel,
                            error = %err,
                            "sent notification not recorded, writing it again"
                        );
                        self.save(&notification).await?;
                    }
                    metrics::counter!("notifications_sent_total", "channel" => channel.as_str())
                        .increment(1);
                    tracing::info!(notification_id = %notification.id, %channel, "notification sent");
                }
                Err(err) => {
                    tracing::warn!(
                        notification_id = %notification.id,
                        %channel,
                        attempts = notification.attempts,
                        error = %err,
                        "notification delivery failed"
                    );
                    notification.record_failure(err.to_string());
                    persist(tx, &notification).await?;
                    failed.push(notification);
                }
            }
        }

        if failed.is_empty() {
            return Ok(DispatchOutcome::Completed);
        }
        if task.retries < self.config.max_retries {
            return Ok(DispatchOutcome::Retry {
                delay: self.config.retry_delay,
            });
        }

        for mut notification in failed {
            notification.mark_failed();
            self.save(&notification).await?;
            metrics::counter!("notifications_failed_total", "channel" => notification.channel.as_str())
                .increment(1);
            tracing::error!(
                notification_id = %notification.id,
                channel = %notification.channel,
                "notification failed permanently"
            );
        }
        Ok(DispatchOutcome::Exhausted)
    }

    /// Fetches the row for `(key, channel)`, creating it if needed.
    async fn notification_row(
        &self,
        job: &DispatchJob,
        channel: Channel,
        payload: &Value,
    ) -> Result<Notification, DispatchError> {
        let key = idempotency_key(job.unique_key.as_deref(), channel);

        let mut tx = self.store.begin().await?;
        if let Some(key) = key.as_deref()
            && let Some(existing) = tx.find_notification(key, channel).await?
        {
            return Ok(existing);
        }

        let new = NewNotification {
            order_id: job.order_id,
            unique_key: key.clone(),
            channel,
            payload: payload.clone(),
        };
        let inserted = match tx.insert_notification(new).await {
            Ok(row) => tx.commit().await.map(|()| row),
            Err(err) => Err(err),
        };

        match (inserted, key) {
            (Ok(row), _) => Ok(row),
            (Err(err), Some(key))
                if err.is_unique_violation(constraints::UNIQUE_NOTIFICATION_PER_CHANNEL) =>
            {
                // Another worker created it first.
                let mut tx = self.store.begin().await?;
                match tx.find_notification(&key, channel).await? {
                    Some(existing) => Ok(existing),
                    None => Err(err.into()),
                }
            }
            (Err(err), _) => Err(err.into()),
        }
    }

    async fn save(&self, notification: &Notification) -> Result<(), DispatchError> {
        let tx = self.store.begin().await?;
        persist(tx, notification).await
    }
}

async fn persist<T: Transaction>(mut tx: T, notification: &Notification) -> Result<(), DispatchError> {
    tx.update_notification(notification).await?;
    tx.commit().await?;
    Ok(())
}
