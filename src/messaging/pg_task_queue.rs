//! # PostgreSQL Task Queue
//!
//! Table-backed queue shared by every worker process. Pops lease the oldest
//! visible row with `FOR UPDATE SKIP LOCKED`, pushing its `visible_at` past the
//! visibility timeout; the row is deleted only once the consumer acknowledges
//! it, so a task held by a crashed worker becomes visible again on its own.
//!
//! ## Database Schema
//!
//! ```sql
//! CREATE TABLE flowstart_queue_tasks (
//!   id BIGSERIAL PRIMARY KEY,
//!   queue TEXT NOT NULL,
//!   task_type TEXT NOT NULL,
//!   payload JSONB NOT NULL,
//!   read_count INTEGER NOT NULL DEFAULT 0,
//!   enqueued_at TIMESTAMPTZ NOT NULL DEFAULT now(),
//!   visible_at TIMESTAMPTZ NOT NULL DEFAULT now()
//! );
//! ```

use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{debug, error};

use super::errors::{QueueError, QueueResult};
use super::message::QueuedTask;
use super::task_queue::TaskQueue;
use crate::constants::DEFAULT_VISIBILITY_TIMEOUT_SECONDS;

#[derive(Debug, Clone)]
pub struct PgTaskQueue {
    pool: PgPool,
    visibility_timeout: Duration,
}

impl PgTaskQueue {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            visibility_timeout: Duration::from_secs(DEFAULT_VISIBILITY_TIMEOUT_SECONDS),
        }
    }

    pub fn with_visibility_timeout(mut self, visibility_timeout: Duration) -> Self {
        self.visibility_timeout = visibility_timeout;
        self
    }
}

#[async_trait]
impl TaskQueue for PgTaskQueue {
    async fn push(
        &self,
        queue: &str,
        task_type: &str,
        payload: serde_json::Value,
    ) -> QueueResult<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO flowstart_queue_tasks (queue, task_type, payload)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(queue)
        .bind(task_type)
        .bind(&payload)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!(queue = %queue, error = %e, "Failed to push task");
            QueueError::queue_operation(queue, "push", e.to_string())
        })?;

        debug!(queue = %queue, task_id = id, task_type = %task_type, "Task pushed");
        Ok(id)
    }

    async fn pop(&self, queue: &str) -> QueueResult<Option<QueuedTask>> {
        sqlx::query_as::<_, QueuedTask>(
            r#"
            UPDATE flowstart_queue_tasks
            SET visible_at = now() + make_interval(secs => $2),
                read_count = read_count + 1
            WHERE id = (
                SELECT id FROM flowstart_queue_tasks
                WHERE queue = $1 AND visible_at <= now()
                ORDER BY id
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING id, queue, task_type, payload, read_count, enqueued_at
            "#,
        )
        .bind(queue)
        .bind(self.visibility_timeout.as_secs_f64())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| QueueError::queue_operation(queue, "pop", e.to_string()))
    }

    async fn delete(&self, queue: &str, task_id: i64) -> QueueResult<()> {
        let result = sqlx::query("DELETE FROM flowstart_queue_tasks WHERE queue = $1 AND id = $2")
            .bind(queue)
            .bind(task_id)
            .execute(&self.pool)
            .await
            .map_err(|e| QueueError::queue_operation(queue, "delete", e.to_string()))?;

        debug!(queue = %queue, task_id = task_id, deleted = result.rows_affected(), "Task deleted");
        Ok(())
    }

    async fn release(&self, queue: &str, task_id: i64) -> QueueResult<()> {
        sqlx::query(
            "UPDATE flowstart_queue_tasks SET visible_at = now() WHERE queue = $1 AND id = $2",
        )
        .bind(queue)
        .bind(task_id)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::queue_operation(queue, "release", e.to_string()))?;

        debug!(queue = %queue, task_id = task_id, "Task released");
        Ok(())
    }

    async fn size(&self, queue: &str) -> QueueResult<u64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM flowstart_queue_tasks WHERE queue = $1")
                .bind(queue)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| QueueError::queue_operation(queue, "size", e.to_string()))?;
        Ok(count.max(0) as u64)
    }
}
