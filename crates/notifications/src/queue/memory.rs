use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::TaskId;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use super::{ClaimedTask, DispatchJob, TaskQueue};
use crate::error::QueueError;

#[derive(Debug, Clone)]
struct Entry {
    id: TaskId,
    job: DispatchJob,
    retries: u32,
    ready_at: Instant,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: Vec<Entry>,
    in_flight: HashMap<TaskId, Entry>,
    fail_on_enqueue: bool,
}

/// Process-local task queue.
///
/// Tasks are lost on restart. Due tasks are claimed in `ready_at` order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskQueue {
    state: Arc<Mutex<QueueState>>,
    notify: Arc<Notify>,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes enqueue fail (for testing enqueue failure handling)
    pub async fn set_fail_on_enqueue(&self, fail: bool) {
        self.state.lock().await.fail_on_enqueue = fail;
    }

    /// Jobs waiting to be claimed, due or not, in `ready_at` order.
    pub async fn pending_jobs(&self) -> Vec<DispatchJob> {
        let state = self.state.lock().await;
        let mut pending = state.pending.clone();
        pending.sort_by_key(|entry| entry.ready_at);
        pending.into_iter().map(|entry| entry.job).collect()
    }

    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn in_flight_count(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, job: DispatchJob) -> Result<TaskId, QueueError> {
        let mut state = self.state.lock().await;
        if state.fail_on_enqueue {
            return Err(QueueError::Unavailable("enqueue disabled".to_string()));
        }
        let id = TaskId::new();
        state.pending.push(Entry {
            id,
            job,
            retries: 0,
            ready_at: Instant::now(),
        });
        drop(state);

        self.notify.notify_one();
        Ok(id)
    }

    async fn claim(&self) -> Result<Option<ClaimedTask>, QueueError> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let next = state
            .pending
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.ready_at <= now)
            .min_by_key(|(_, entry)| entry.ready_at)
            .map(|(index, _)| index);

        let Some(index) = next else {
            return Ok(None);
        };
        let entry = state.pending.swap_remove(index);
        let task = ClaimedTask {
            id: entry.id,
            job: entry.job.clone(),
            retries: entry.retries,
        };
        state.in_flight.insert(entry.id, entry);
        Ok(Some(task))
    }

    async fn ack(&self, task: TaskId) -> Result<(), QueueError> {
        self.state.lock().await.in_flight.remove(&task);
        Ok(())
    }

    async fn reschedule(&self, task: TaskId, delay: Duration) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let Some(mut entry) = state.in_flight.remove(&task) else {
            return Err(QueueError::Unavailable(format!("task {task} is not in flight")));
        };
        entry.retries += 1;
        entry.ready_at = Instant::now() + delay;
        state.pending.push(entry);
        Ok(())
    }

    async fn idle(&self, max_wait: Duration) {
        let _ = tokio::time::timeout(max_wait, self.notify.notified()).await;
    }
}
