//! # Flow Run Model
//!
//! One execution of a flow for one contact. Runs are created by the flow
//! runner; the dispatch pipeline only reads them to decide eligibility.
//!
//! ## Database Schema
//!
//! Maps to `flows_flowrun`:
//! ```sql
//! CREATE TABLE flows_flowrun (
//!   id BIGSERIAL PRIMARY KEY,
//!   uuid UUID NOT NULL UNIQUE,
//!   contact_id BIGINT NOT NULL,
//!   flow_id BIGINT NOT NULL,
//!   start_id BIGINT REFERENCES flows_flowstart(id),
//!   is_active BOOLEAN NOT NULL,
//!   -- ... timestamps
//!   UNIQUE (contact_id, start_id)
//! );
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::ids::{ContactId, FlowId, FlowRunId, FlowStartId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct FlowRun {
    pub id: FlowRunId,
    pub uuid: Uuid,
    pub contact_id: ContactId,
    pub flow_id: FlowId,
    pub start_id: Option<FlowStartId>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl FlowRun {
    pub fn is_active_in(&self, flow_id: FlowId) -> bool {
        self.is_active && self.flow_id == flow_id
    }

    pub fn belongs_to_start(&self, start_id: FlowStartId) -> bool {
        self.start_id == Some(start_id)
    }
}
