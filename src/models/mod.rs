//! # Dispatch Models
//!
//! Entities read and written by the flow-start dispatch pipeline.

pub mod contact;
pub mod flow_run;
pub mod flow_start;
pub mod flow_start_batch;
pub mod ids;

pub use contact::{Contact, ContactGroup};
pub use flow_run::FlowRun;
pub use flow_start::{FlowStart, FlowStartStatus, FlowType, NewFlowStart};
pub use flow_start_batch::FlowStartBatch;
pub use ids::{ContactId, FlowId, FlowRunId, FlowStartId, GroupId, OrgId};
