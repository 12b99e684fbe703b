//! # Flow Start Batch
//!
//! An immutable slice of a start's audience, carried on the queue as the
//! payload of a `start_flow_batch` task. Batches are never persisted.

use serde::{Deserialize, Serialize};

use super::flow_start::{FlowStart, FlowType};
use super::ids::{ContactId, FlowId, FlowStartId, OrgId};

/// One unit of asynchronous work for a flow start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowStartBatch {
    pub start_id: FlowStartId,
    pub org_id: OrgId,
    pub flow_id: FlowId,
    pub flow_type: FlowType,
    /// Dispatch generation of the start this batch was split under
    #[serde(default)]
    pub generation: u32,
    /// Zero-based position of this batch within its start
    pub batch_index: u32,
    pub contact_ids: Vec<ContactId>,
    pub restart_participants: bool,
    pub include_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
    /// Deduplicated audience size of the whole start
    pub total_contacts: i64,
    pub is_last: bool,
}

impl FlowStartBatch {
    /// Build a batch for `start` holding `contact_ids`
    pub fn for_start(
        start: &FlowStart,
        batch_index: u32,
        contact_ids: Vec<ContactId>,
        total_contacts: i64,
        is_last: bool,
    ) -> Self {
        Self {
            start_id: start.id,
            org_id: start.org_id,
            flow_id: start.flow_id,
            flow_type: start.flow_type,
            generation: 0,
            batch_index,
            contact_ids,
            restart_participants: start.restart_participants,
            include_active: start.include_active,
            extra: start.extra.clone(),
            total_contacts,
            is_last,
        }
    }

    /// Stamp the dispatch generation assigned when the batch count was recorded
    pub fn with_generation(mut self, generation: u32) -> Self {
        self.generation = generation;
        self
    }

    pub fn len(&self) -> usize {
        self.contact_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contact_ids.is_empty()
    }
}
