//! # Flow Start Service
//!
//! Entry point of the dispatch pipeline. A caller hands over a persisted
//! pending start; the service classifies it, resolves its audience, splits it
//! into batches and queues them, returning as soon as every batch task is
//! queued. Run creation and completion happen later on the worker side.
//!
//! ## Failure Semantics
//!
//! - Resolution failures leave the start pending with nothing queued.
//! - Enqueue failures leave the start pending with some batches possibly
//!   queued. [`FlowStartService::resume`] resolves and splits the start again
//!   under a new dispatch generation; batches still queued from the earlier
//!   dispatch create no runs and never count toward completion, and contacts
//!   that already got their run are skipped by the worker.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::config::{DispatchConfig, FlowStartConfig, QueueConfig};
use crate::constants::operations;
use crate::error::{FlowStartError, Result};
use crate::logging::log_start_operation;
use crate::messaging::TaskQueue;
use crate::models::{FlowStart, FlowStartId, NewFlowStart};
use crate::search::ContactSearch;
use crate::store::StartStore;

use super::audience_resolver::AudienceResolver;
use super::batch_dispatcher::BatchDispatcher;
use super::batch_splitter::split_into_batches;
use super::completion_tracker::CompletionTracker;
use super::queue_classifier::{classify, DispatchQueue};

/// Result of dispatching one start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub start_id: FlowStartId,
    pub queue: DispatchQueue,
    pub queue_name: String,
    /// Deduplicated audience size
    pub contact_count: usize,
    pub batch_count: usize,
    /// The start completed during dispatch because its audience was empty
    pub completed: bool,
}

pub struct FlowStartService {
    store: Arc<dyn StartStore>,
    resolver: AudienceResolver,
    dispatcher: BatchDispatcher,
    tracker: CompletionTracker,
    dispatch: DispatchConfig,
    queues: QueueConfig,
}

impl FlowStartService {
    pub fn new(
        store: Arc<dyn StartStore>,
        search: Arc<dyn ContactSearch>,
        queue: Arc<dyn TaskQueue>,
        config: &FlowStartConfig,
    ) -> Self {
        Self {
            resolver: AudienceResolver::new(store.clone(), search, config.search.max_pages),
            dispatcher: BatchDispatcher::new(store.clone(), queue),
            tracker: CompletionTracker::new(store.clone()),
            store,
            dispatch: config.dispatch.clone(),
            queues: config.queues.clone(),
        }
    }

    /// Persist a new start and dispatch it
    pub async fn create_and_start(&self, new_start: NewFlowStart) -> Result<(FlowStart, DispatchOutcome)> {
        let start = self.store.insert_flow_start(new_start).await?;
        let outcome = self.start(&start).await?;
        Ok((start, outcome))
    }

    #[instrument(skip(self, start), fields(start_id = start.id.as_i64()))]
    pub async fn start(&self, start: &FlowStart) -> Result<DispatchOutcome> {
        if start.is_complete() {
            return Err(FlowStartError::Validation(format!(
                "flow start {} is already complete",
                start.id
            )));
        }

        let queue = classify(start);
        let queue_name = queue.queue_name(&self.queues).to_string();
        log_start_operation(operations::CLASSIFY, start.id, Some(&queue_name), "classified", None);

        let audience = match self.resolver.resolve(start).await {
            Ok(audience) => audience,
            Err(e) => {
                log_start_operation(
                    operations::RESOLVE,
                    start.id,
                    Some(&queue_name),
                    "failed",
                    Some(&e.to_string()),
                );
                return Err(e);
            }
        };
        log_start_operation(
            operations::RESOLVE,
            start.id,
            Some(&queue_name),
            "resolved",
            Some(&format!("contacts={}", audience.len())),
        );

        let batches = split_into_batches(start, &audience, self.dispatch.max_batch_size)?;

        if batches.is_empty() {
            self.tracker.complete_empty(start.id).await?;
            info!(start_id = start.id.as_i64(), "Flow start has no audience, completed");
            return Ok(DispatchOutcome {
                start_id: start.id,
                queue,
                queue_name,
                contact_count: 0,
                batch_count: 0,
                completed: true,
            });
        }

        let batch_count = self.dispatcher.dispatch(start, &batches, &queue_name).await?;
        info!(
            start_id = start.id.as_i64(),
            queue = %queue_name,
            contacts = audience.len(),
            batches = batch_count,
            "Flow start dispatched"
        );

        Ok(DispatchOutcome {
            start_id: start.id,
            queue,
            queue_name,
            contact_count: audience.len(),
            batch_count,
            completed: false,
        })
    }

    /// Re-dispatch a start that is still pending, e.g. after a dispatch error.
    /// The audience is resolved afresh, so `contact_count` reflects this resolution.
    pub async fn resume(&self, start_id: FlowStartId) -> Result<DispatchOutcome> {
        let start = self
            .store
            .find_flow_start(start_id)
            .await?
            .ok_or(FlowStartError::StartNotFound(start_id))?;

        info!(start_id = start_id.as_i64(), batch_count = ?start.batch_count, "Resuming flow start");
        self.start(&start).await
    }
}
