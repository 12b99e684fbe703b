//! # Batch Dispatcher
//!
//! Persists how many batches a start was split into, then enqueues one
//! `start_flow_batch` task per batch. The count is written first so that a
//! fast worker finishing batch 0 can never observe a start whose remaining
//! batches are unknown. Writing it opens a new dispatch generation, which is
//! stamped on every queued batch.

use std::sync::Arc;
use tracing::{debug, error, instrument};

use crate::constants::{operations, START_FLOW_BATCH_TASK};
use crate::error::{FlowStartError, Result};
use crate::logging::log_start_operation;
use crate::messaging::{encode_batch, TaskQueue};
use crate::models::{FlowStart, FlowStartBatch};
use crate::store::StartStore;

pub struct BatchDispatcher {
    store: Arc<dyn StartStore>,
    queue: Arc<dyn TaskQueue>,
}

impl BatchDispatcher {
    pub fn new(store: Arc<dyn StartStore>, queue: Arc<dyn TaskQueue>) -> Self {
        Self { store, queue }
    }

    /// Enqueue every batch of `start` on `queue_name`, returning how many were queued
    #[instrument(skip(self, start, batches), fields(start_id = start.id.as_i64(), batches = batches.len()))]
    pub async fn dispatch(
        &self,
        start: &FlowStart,
        batches: &[FlowStartBatch],
        queue_name: &str,
    ) -> Result<usize> {
        let Some(generation) = self
            .store
            .begin_dispatch(start.id, batches.len() as u32)
            .await?
        else {
            return Err(FlowStartError::Validation(format!(
                "flow start {} is already complete",
                start.id
            )));
        };

        for batch in batches {
            let batch = batch.clone().with_generation(generation);
            let payload = encode_batch(&batch)
                .map_err(|e| FlowStartError::dispatch(start.id, e.to_string()))?;

            let task_id = self
                .queue
                .push(queue_name, START_FLOW_BATCH_TASK, payload)
                .await
                .map_err(|e| {
                    error!(
                        start_id = start.id.as_i64(),
                        batch_index = batch.batch_index,
                        queue = queue_name,
                        error = %e,
                        "Failed to enqueue batch"
                    );
                    FlowStartError::dispatch(
                        start.id,
                        format!("batch {} not queued: {e}", batch.batch_index),
                    )
                })?;

            debug!(
                start_id = start.id.as_i64(),
                batch_index = batch.batch_index,
                task_id = task_id,
                generation = generation,
                contacts = batch.len(),
                "Batch queued"
            );
        }

        log_start_operation(
            operations::DISPATCH,
            start.id,
            Some(queue_name),
            "queued",
            Some(&format!("batches={}", batches.len())),
        );

        Ok(batches.len())
    }
}
