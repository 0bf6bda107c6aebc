use std::time::Duration;

use async_trait::async_trait;
use common::TaskId;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{ClaimedTask, DispatchJob, TaskQueue};
use crate::error::QueueError;

/// How long a claim stays exclusive before the task is redelivered.
const DEFAULT_LEASE: Duration = Duration::from_secs(300);

/// Task queue backed by the `notification_tasks` table.
///
/// Claims use `FOR UPDATE SKIP LOCKED` so concurrent workers never take the
/// same row, and set a lease so a task claimed by a crashed worker becomes
/// due again once the lease runs out.
#[derive(Clone)]
pub struct PostgresTaskQueue {
    pool: PgPool,
    lease: Duration,
}

impl PostgresTaskQueue {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lease: DEFAULT_LEASE,
        }
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }
}

#[async_trait]
impl TaskQueue for PostgresTaskQueue {
    #[tracing::instrument(skip(self, job), fields(order_id = %job.order_id, event = %job.event))]
    async fn enqueue(&self, job: DispatchJob) -> Result<TaskId, QueueError> {
        let id = TaskId::new();
        sqlx::query("INSERT INTO notification_tasks (id, job) VALUES ($1, $2)")
            .bind(id.as_uuid())
            .bind(serde_json::to_value(&job)?)
            .execute(&self.pool)
            .await?;
        Ok(id)
    }

    async fn claim(&self) -> Result<Option<ClaimedTask>, QueueError> {
        let row = sqlx::query(
            r#"
            UPDATE notification_tasks
            SET locked_until = NOW() + make_interval(secs => $1)
            WHERE id = (
                SELECT id FROM notification_tasks
                WHERE run_at <= NOW()
                  AND (locked_until IS NULL OR locked_until < NOW())
                ORDER BY run_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING id, job, retries
            "#,
        )
        .bind(self.lease.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let id: Uuid = row.try_get("id")?;
        let job: serde_json::Value = row.try_get("job")?;
        let retries: i32 = row.try_get("retries")?;

        Ok(Some(ClaimedTask {
            id: TaskId::from_uuid(id),
            job: serde_json::from_value(job)?,
            retries: u32::try_from(retries).unwrap_or(0),
        }))
    }

    async fn ack(&self, task: TaskId) -> Result<(), QueueError> {
        sqlx::query("DELETE FROM notification_tasks WHERE id = $1")
            .bind(task.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn reschedule(&self, task: TaskId, delay: Duration) -> Result<(), QueueError> {
        let result = sqlx::query(
            r#"
            UPDATE notification_tasks
            SET retries = retries + 1,
                run_at = NOW() + make_interval(secs => $2),
                locked_until = NULL
            WHERE id = $1
            "#,
        )
        .bind(task.as_uuid())
        .bind(delay.as_secs_f64())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::Unavailable(format!("task {task} does not exist")));
        }
        Ok(())
    }
}
