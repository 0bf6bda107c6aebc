//! Durable at-least-once queue of notification jobs.

mod memory;
mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use common::{OrderId, TaskId};
use domain::{Channel, User};
use serde::{Deserialize, Serialize};

use crate::error::QueueError;

pub use memory::InMemoryTaskQueue;
pub use postgres::PostgresTaskQueue;

/// One request to notify an order's customer about an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchJob {
    /// Deduplication key shared by every channel; `None` disables dedup.
    pub unique_key: Option<String>,
    pub order_id: OrderId,
    pub event: String,
    /// Channel names as requested. Unknown names are skipped at dispatch time.
    pub channels: Vec<String>,
}

impl DispatchJob {
    pub fn new(
        unique_key: Option<String>,
        order_id: OrderId,
        event: impl Into<String>,
        channels: Vec<String>,
    ) -> Self {
        Self {
            unique_key,
            order_id,
            event: event.into(),
            channels,
        }
    }

    /// Job for a known set of channels.
    pub fn for_channels(
        unique_key: impl Into<String>,
        order_id: OrderId,
        event: impl Into<String>,
        channels: &[Channel],
    ) -> Self {
        Self::new(
            Some(unique_key.into()),
            order_id,
            event,
            channels.iter().map(|c| c.as_str().to_string()).collect(),
        )
    }
}

/// A job handed to a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedTask {
    pub id: TaskId,
    pub job: DispatchJob,
    /// Retries already scheduled for this task (0 on first delivery).
    pub retries: u32,
}

/// Queue of notification jobs.
///
/// A claimed task stays invisible to other workers until it is acked or
/// rescheduled. Implementations may redeliver a task whose worker vanished.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, job: DispatchJob) -> Result<TaskId, QueueError>;

    /// Takes the next due task, if any.
    async fn claim(&self) -> Result<Option<ClaimedTask>, QueueError>;

    /// Removes a finished task.
    async fn ack(&self, task: TaskId) -> Result<(), QueueError>;

    /// Makes a claimed task due again after `delay`, counting one more retry.
    async fn reschedule(&self, task: TaskId, delay: Duration) -> Result<(), QueueError>;

    /// Waits up to `max_wait` for new work to possibly be available.
    async fn idle(&self, max_wait: Duration) {
        tokio::time::sleep(max_wait).await;
    }
}

/// Queues `event` for every channel `customer` opted into.
///
/// Returns `None` when the customer has no usable channel or the queue
/// refused the job. A refusal is logged and otherwise ignored: notifying is
/// never allowed to fail the workflow that triggered it.
pub async fn enqueue_for_customer(
    queue: &dyn TaskQueue,
    customer: &User,
    order_id: OrderId,
    event: &str,
    unique_key: String,
) -> Option<TaskId> {
    let channels = customer.notification_channels();
    if channels.is_empty() {
        tracing::debug!(%order_id, event, "customer has no notification channels");
        return None;
    }

    match queue
        .enqueue(DispatchJob::for_channels(unique_key, order_id, event, &channels))
        .await
    {
        Ok(task_id) => Some(task_id),
        Err(err) => {
            tracing::warn!(%order_id, event, error = %err, "failed to enqueue notification");
            None
        }
    }
}
