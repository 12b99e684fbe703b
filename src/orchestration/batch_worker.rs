//! # Batch Worker
//!
//! Applies per-contact eligibility to one dequeued batch, asks the flow runner
//! for a run for every eligible contact, then reports the batch to the
//! completion tracker.
//!
//! ## Eligibility
//!
//! Evaluated in order for each contact:
//!
//! 1. A run already attributed to this start: skipped, so redelivered batches
//!    create nothing.
//! 2. Active in the target flow: eligible only when the start restarts
//!    participants, superseding that run.
//! 3. Active in some other flow: eligible only when the start includes active
//!    contacts.
//! 4. Otherwise eligible.
//!
//! Batches split under an earlier dispatch generation of their start are
//! reported to the tracker without creating runs.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::constants::operations;
use crate::error::{FlowStartError, Result};
use crate::execution::{FlowRunner, RunOutcome, RunRequest};
use crate::logging::log_batch_operation;
use crate::messaging::QueuedTask;
use crate::models::{ContactId, FlowRun, FlowStartBatch, FlowStartId};
use crate::store::{CompletionOutcome, StartStore};

use super::completion_tracker::CompletionTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    /// Start a fresh run
    Eligible,
    /// Start a run superseding the active one in the target flow
    Restart,
    AlreadyStarted,
    ActiveInFlow,
    ActiveElsewhere,
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible | Self::Restart)
    }
}

/// Decide whether one contact of `batch` gets a run
pub fn evaluate_eligibility(
    batch: &FlowStartBatch,
    already_started: bool,
    active_runs: &[FlowRun],
) -> Eligibility {
    if already_started {
        return Eligibility::AlreadyStarted;
    }

    let active_in_flow = active_runs.iter().any(|run| run.is_active_in(batch.flow_id));
    let active_elsewhere = active_runs
        .iter()
        .any(|run| run.is_active && run.flow_id != batch.flow_id);

    if active_in_flow && !batch.restart_participants {
        Eligibility::ActiveInFlow
    } else if active_elsewhere && !batch.include_active {
        Eligibility::ActiveElsewhere
    } else if active_in_flow {
        Eligibility::Restart
    } else {
        Eligibility::Eligible
    }
}

/// What processing one batch did
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub start_id: FlowStartId,
    pub batch_index: u32,
    pub contacts: usize,
    pub runs_created: usize,
    /// Contacts that were not eligible or already had their run
    pub skipped: usize,
    /// Contacts whose run could not be created
    pub failed: usize,
    pub completion: CompletionOutcome,
}

pub struct BatchWorker {
    store: Arc<dyn StartStore>,
    runner: Arc<dyn FlowRunner>,
    tracker: CompletionTracker,
}

impl BatchWorker {
    pub fn new(store: Arc<dyn StartStore>, runner: Arc<dyn FlowRunner>) -> Self {
        let tracker = CompletionTracker::new(store.clone());
        Self {
            store,
            runner,
            tracker,
        }
    }

    /// Decode and process a queued `start_flow_batch` task
    pub async fn process_task(&self, task: &QueuedTask) -> Result<BatchReport> {
        let batch = task.decode_batch().map_err(|e| {
            FlowStartError::worker(format!("task {} on {}: {e}", task.id, task.queue))
        })?;
        self.process(&batch).await
    }

    #[instrument(skip(self, batch), fields(start_id = batch.start_id.as_i64(), batch_index = batch.batch_index))]
    pub async fn process(&self, batch: &FlowStartBatch) -> Result<BatchReport> {
        let start = self
            .store
            .find_flow_start(batch.start_id)
            .await?
            .ok_or(FlowStartError::StartNotFound(batch.start_id))?;

        if !start.is_complete() && start.dispatch_generation.max(0) as u32 != batch.generation {
            let completion = self.tracker.record_batch_done(batch).await?;
            log_batch_operation(
                operations::PROCESS_BATCH,
                batch.start_id,
                batch.batch_index,
                batch.len(),
                Some(0),
                "superseded",
            );
            return Ok(BatchReport {
                start_id: batch.start_id,
                batch_index: batch.batch_index,
                contacts: batch.len(),
                runs_created: 0,
                skipped: batch.len(),
                failed: 0,
                completion,
            });
        }

        let started: HashSet<ContactId> = self
            .store
            .contacts_with_start_runs(batch.start_id, &batch.contact_ids)
            .await?
            .into_iter()
            .collect();

        let mut active_by_contact: HashMap<ContactId, Vec<FlowRun>> = HashMap::new();
        for run in self.store.active_runs_for_contacts(&batch.contact_ids).await? {
            active_by_contact.entry(run.contact_id).or_default().push(run);
        }

        let mut runs_created = 0;
        let mut skipped = 0;
        let mut failed = 0;

        for &contact_id in &batch.contact_ids {
            let active_runs = active_by_contact
                .get(&contact_id)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let eligibility =
                evaluate_eligibility(batch, started.contains(&contact_id), active_runs);

            if !eligibility.is_eligible() {
                debug!(contact_id = contact_id.as_i64(), ?eligibility, "Contact not eligible");
                skipped += 1;
                continue;
            }

            let request =
                RunRequest::for_batch(batch, contact_id, eligibility == Eligibility::Restart);
            match self.runner.create_or_restart_run(request).await {
                Ok(RunOutcome::Created(_)) => runs_created += 1,
                Ok(RunOutcome::AlreadyStarted(_)) => skipped += 1,
                Ok(RunOutcome::ActiveInFlow(run)) => {
                    debug!(
                        contact_id = contact_id.as_i64(),
                        run_id = run.id.as_i64(),
                        "Contact entered the flow after eligibility was evaluated"
                    );
                    skipped += 1;
                }
                Err(e) => {
                    warn!(
                        start_id = batch.start_id.as_i64(),
                        contact_id = contact_id.as_i64(),
                        error = %e,
                        "Run creation failed, continuing batch"
                    );
                    failed += 1;
                }
            }
        }

        let completion = self.tracker.record_batch_done(batch).await?;

        log_batch_operation(
            operations::PROCESS_BATCH,
            batch.start_id,
            batch.batch_index,
            batch.len(),
            Some(runs_created),
            if failed == 0 { "processed" } else { "processed_with_failures" },
        );

        Ok(BatchReport {
            start_id: batch.start_id,
            batch_index: batch.batch_index,
            contacts: batch.len(),
            runs_created,
            skipped,
            failed,
            completion,
        })
    }
}
