//! Background workers draining the task queue.

use std::sync::Arc;
use std::time::Duration;

use storage::Store;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::dispatcher::{DispatchOutcome, NotificationDispatcher};
use crate::error::QueueError;
use crate::queue::TaskQueue;

/// Worker pool settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    pub workers: usize,
    /// Upper bound on how long an idle worker waits before polling again.
    pub poll_interval: Duration,
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            workers: std::env::var("NOTIFY_WORKERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.workers),
            poll_interval: std::env::var("NOTIFY_POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Claims one due task and runs it through the dispatcher.
///
/// Returns `None` when nothing was due. A dispatch that errors before
/// reaching a verdict is retried like a delivery failure, and dropped once
/// retries are used up.
pub async fn process_next<S: Store>(
    queue: &dyn TaskQueue,
    dispatcher: &NotificationDispatcher<S>,
) -> Result<Option<DispatchOutcome>, QueueError> {
    let Some(task) = queue.claim().await? else {
        return Ok(None);
    };

    let config = dispatcher.config();
    let outcome = match dispatcher.dispatch(&task).await {
        Ok(outcome) => outcome,
        Err(err) if task.retries < config.max_retries => {
            tracing::error!(task_id = %task.id, error = %err, "dispatch failed, retrying");
            DispatchOutcome::Retry {
                delay: config.retry_delay,
            }
        }
        Err(err) => {
            tracing::error!(task_id = %task.id, error = %err, "dispatch failed, giving up");
            DispatchOutcome::Exhausted
        }
    };

    match outcome {
        DispatchOutcome::Retry { delay } => queue.reschedule(task.id, delay).await?,
        DispatchOutcome::Completed | DispatchOutcome::Exhausted => queue.ack(task.id).await?,
    }
    Ok(Some(outcome))
}

/// A fixed set of tokio tasks draining a [`TaskQueue`].
pub struct WorkerPool {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn<S: Store>(
        config: WorkerConfig,
        queue: Arc<dyn TaskQueue>,
        dispatcher: Arc<NotificationDispatcher<S>>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let handles = (0..config.workers.max(1))
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    queue.clone(),
                    dispatcher.clone(),
                    config.poll_interval,
                    cancel.clone(),
                ))
            })
            .collect();

        tracing::info!(workers = config.workers.max(1), "notification workers started");
        Self { cancel, handles }
    }

    /// Stops claiming new work and waits for in-progress tasks to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for handle in self.handles {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "notification worker panicked");
            }
        }
        tracing::info!("notification workers stopped");
    }
}

async fn run_worker<S: Store>(
    worker: usize,
    queue: Arc<dyn TaskQueue>,
    dispatcher: Arc<NotificationDispatcher<S>>,
    poll_interval: Duration,
    cancel: CancellationToken,
) {
    while !cancel.is_cancelled() {
        match process_next(queue.as_ref(), dispatcher.as_ref()).await {
            Ok(Some(_)) => continue,
            Ok(None) => {}
            Err(err) => tracing::error!(worker, error = %err, "task queue error"),
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = queue.idle(poll_interval) => {}
        }
    }
}
