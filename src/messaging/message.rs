//! # Queued Task Envelope
//!
//! The unit moved through the task queue: a type discriminator plus a JSON
//! payload. Batch tasks carry a serialized [`FlowStartBatch`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::errors::{QueueError, QueueResult};
use crate::constants::START_FLOW_BATCH_TASK;
use crate::models::FlowStartBatch;

/// A task popped from a queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct QueuedTask {
    /// Queue-assigned identifier, increasing in enqueue order
    pub id: i64,
    pub queue: String,
    pub task_type: String,
    pub payload: serde_json::Value,
    /// Deliveries so far, this one included
    #[serde(default)]
    pub read_count: i32,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedTask {
    pub fn is_start_flow_batch(&self) -> bool {
        self.task_type == START_FLOW_BATCH_TASK
    }

    /// Decode the payload of a `start_flow_batch` task
    pub fn decode_batch(&self) -> QueueResult<FlowStartBatch> {
        if !self.is_start_flow_batch() {
            return Err(QueueError::UnexpectedTaskType {
                expected: START_FLOW_BATCH_TASK.to_string(),
                actual: self.task_type.clone(),
            });
        }
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// Encode a batch as a task payload
pub fn encode_batch(batch: &FlowStartBatch) -> QueueResult<serde_json::Value> {
    serde_json::to_value(batch).map_err(|e| QueueError::MessageSerialization {
        message: e.to_string(),
    })
}
