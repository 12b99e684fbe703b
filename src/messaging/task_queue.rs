//! # Task Queue Contract
//!
//! Push/pop primitives over named queues with at-least-once delivery. `pop`
//! leases the oldest visible task for the queue's visibility timeout; the
//! consumer then either `delete`s it once handled or `release`s it for
//! another attempt. A task whose lease runs out is delivered again, so a
//! worker that dies mid-batch loses nothing.
//!
//! Implementations must make `push` durable before returning and must never
//! lease one task to two `pop` callers at the same time.

use async_trait::async_trait;

use super::errors::QueueResult;
use super::message::QueuedTask;

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Append a task to `queue`, returning its queue-assigned id
    async fn push(
        &self,
        queue: &str,
        task_type: &str,
        payload: serde_json::Value,
    ) -> QueueResult<i64>;

    /// Lease the oldest visible task on `queue`, if any
    async fn pop(&self, queue: &str) -> QueueResult<Option<QueuedTask>>;

    /// Remove a handled task for good
    async fn delete(&self, queue: &str, task_id: i64) -> QueueResult<()>;

    /// End the lease on a task early so it is delivered again
    async fn release(&self, queue: &str, task_id: i64) -> QueueResult<()>;

    /// Number of tasks on `queue` not yet deleted, leased ones included
    async fn size(&self, queue: &str) -> QueueResult<u64>;
}
