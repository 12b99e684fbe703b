//! # Start Store
//!
//! Relational records the dispatch pipeline reads and writes: flow starts,
//! group membership, flow runs (read only) and the per-start batch
//! bookkeeping behind completion tracking.
//!
//! ## Completion Discipline
//!
//! `record_batch_done` is the only writer of `status` and `contact_count`.
//! Implementations serialize it per start (row lock in PostgreSQL, a mutex in
//! memory) and make it idempotent per batch index, so redelivered batches
//! never advance a start twice.
//!
//! `begin_dispatch` bumps the start's dispatch generation and clears its done
//! set under the same lock. Batches recorded under an older generation are
//! reported as [`CompletionOutcome::Superseded`] and never counted.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{ContactId, FlowRun, FlowStart, FlowStartId, GroupId, NewFlowStart, OrgId};

pub use memory::MemoryStore;
pub use postgres::PgStartStore;

/// Result of recording a finished batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionOutcome {
    /// This call moved the start to complete
    Completed { contact_count: i64 },
    /// More batches are outstanding
    Pending { batches_done: u32, batch_count: u32 },
    /// The start had already been completed by an earlier call
    AlreadyComplete,
    /// The batch belongs to an earlier dispatch of a start that was re-dispatched
    Superseded { generation: u32, current: u32 },
}

impl CompletionOutcome {
    pub fn transitioned(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

#[async_trait]
pub trait StartStore: Send + Sync {
    async fn insert_flow_start(&self, new_start: NewFlowStart) -> Result<FlowStart>;

    async fn find_flow_start(&self, start_id: FlowStartId) -> Result<Option<FlowStart>>;

    /// Active members of the given groups, group by group in id order
    async fn group_contact_ids(&self, org_id: OrgId, group_ids: &[GroupId]) -> Result<Vec<ContactId>>;

    /// Active runs, in any flow, of the given contacts
    async fn active_runs_for_contacts(&self, contact_ids: &[ContactId]) -> Result<Vec<FlowRun>>;

    /// Subset of `contact_ids` already holding a run attributed to `start_id`
    async fn contacts_with_start_runs(
        &self,
        start_id: FlowStartId,
        contact_ids: &[ContactId],
    ) -> Result<Vec<ContactId>>;

    /// Every run attributed to `start_id`
    async fn runs_for_start(&self, start_id: FlowStartId) -> Result<Vec<FlowRun>>;

    /// Record how many batches a pending start was split into, open a new
    /// dispatch generation and forget batches finished under earlier ones.
    /// Returns the new generation, or `None` when the start is already complete.
    async fn begin_dispatch(&self, start_id: FlowStartId, batch_count: u32) -> Result<Option<u32>>;

    /// Mark `batch_index` of `generation` finished and complete the start when
    /// every batch of the current generation is done
    async fn record_batch_done(
        &self,
        start_id: FlowStartId,
        generation: u32,
        batch_index: u32,
        contact_count: i64,
    ) -> Result<CompletionOutcome>;

    /// Complete a start whose audience resolved to nobody
    async fn complete_empty(&self, start_id: FlowStartId) -> Result<CompletionOutcome>;
}
