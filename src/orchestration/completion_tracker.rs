//! # Completion Tracker
//!
//! Records finished batches against their start and reports the single call
//! that moved the start to `complete`. The store serializes the check and
//! the transition, so concurrent workers finishing the last two batches see
//! exactly one `Completed`.

use std::sync::Arc;
use tracing::{debug, info};

use crate::constants::operations;
use crate::error::Result;
use crate::logging::log_start_operation;
use crate::models::{FlowStartBatch, FlowStartId};
use crate::store::{CompletionOutcome, StartStore};

#[derive(Clone)]
pub struct CompletionTracker {
    store: Arc<dyn StartStore>,
}

impl CompletionTracker {
    pub fn new(store: Arc<dyn StartStore>) -> Self {
        Self { store }
    }

    /// Record that `batch` finished; `contact_count` is taken from the batch's
    /// resolved audience size, not from how many runs it created
    pub async fn record_batch_done(&self, batch: &FlowStartBatch) -> Result<CompletionOutcome> {
        let outcome = self
            .store
            .record_batch_done(
                batch.start_id,
                batch.generation,
                batch.batch_index,
                batch.total_contacts,
            )
            .await?;

        match outcome {
            CompletionOutcome::Completed { contact_count } => {
                info!(
                    start_id = batch.start_id.as_i64(),
                    batch_index = batch.batch_index,
                    contact_count = contact_count,
                    "Flow start complete"
                );
                log_start_operation(
                    operations::COMPLETE,
                    batch.start_id,
                    None,
                    "complete",
                    Some(&format!("contact_count={contact_count}")),
                );
            }
            CompletionOutcome::Pending {
                batches_done,
                batch_count,
            } => {
                debug!(
                    start_id = batch.start_id.as_i64(),
                    batch_index = batch.batch_index,
                    is_last = batch.is_last,
                    batches_done = batches_done,
                    batch_count = batch_count,
                    "Batch finished, start pending"
                );
            }
            CompletionOutcome::AlreadyComplete => {
                debug!(
                    start_id = batch.start_id.as_i64(),
                    batch_index = batch.batch_index,
                    "Batch finished after start already complete"
                );
            }
            CompletionOutcome::Superseded { generation, current } => {
                debug!(
                    start_id = batch.start_id.as_i64(),
                    batch_index = batch.batch_index,
                    generation = generation,
                    current = current,
                    "Batch of an earlier dispatch ignored"
                );
            }
        }

        Ok(outcome)
    }

    /// Complete a start with no audience
    pub async fn complete_empty(&self, start_id: FlowStartId) -> Result<CompletionOutcome> {
        let outcome = self.store.complete_empty(start_id).await?;
        if outcome.transitioned() {
            log_start_operation(
                operations::COMPLETE,
                start_id,
                None,
                "complete",
                Some("empty audience"),
            );
        }
        Ok(outcome)
    }
}
