//! # Flow Execution Contract
//!
//! The batch worker never interprets flows. It asks a [`FlowRunner`] to create
//! (or restart) a run for one contact under one start; the runner owns the
//! conversation state machine. Runners must be idempotent on
//! `(contact, start)`: asking twice yields the existing run, not a second one.
//!
//! Eligibility is decided from a snapshot taken before the batch loop, so
//! runners re-check the target flow under their own lock: a request without
//! `restart` never supersedes an active run, even one created after the
//! snapshot.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{ContactId, FlowId, FlowRun, FlowStartBatch, FlowStartId, FlowType, OrgId};

pub use memory::MemoryFlowRunner;
pub use postgres::PgFlowRunner;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RunnerError {
    #[error("Run creation failed for contact {contact_id}: {message}")]
    CreateFailed {
        contact_id: ContactId,
        message: String,
    },
}

/// Everything the runner needs to place one contact in a flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub org_id: OrgId,
    pub contact_id: ContactId,
    pub flow_id: FlowId,
    pub flow_type: FlowType,
    pub start_id: FlowStartId,
    /// An active run in the same flow may be superseded
    pub restart: bool,
    pub extra: Option<serde_json::Value>,
}

impl RunRequest {
    pub fn for_batch(batch: &FlowStartBatch, contact_id: ContactId, restart: bool) -> Self {
        Self {
            org_id: batch.org_id,
            contact_id,
            flow_id: batch.flow_id,
            flow_type: batch.flow_type,
            start_id: batch.start_id,
            restart,
            extra: batch.extra.clone(),
        }
    }
}

/// What the runner did with a [`RunRequest`]
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Created(FlowRun),
    /// A run for this contact and start already existed
    AlreadyStarted(FlowRun),
    /// The contact is active in the flow and the request may not restart it
    ActiveInFlow(FlowRun),
}

impl RunOutcome {
    pub fn run(&self) -> &FlowRun {
        match self {
            Self::Created(run) | Self::AlreadyStarted(run) | Self::ActiveInFlow(run) => run,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

#[async_trait]
pub trait FlowRunner: Send + Sync {
    async fn create_or_restart_run(&self, request: RunRequest) -> Result<RunOutcome, RunnerError>;
}
