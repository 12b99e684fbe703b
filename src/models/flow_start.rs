//! # Flow Start Model
//!
//! A request to run one flow for an audience of contacts.
//!
//! ## Lifecycle
//!
//! A start is inserted `pending` by the caller, gets its `batch_count` recorded
//! by the dispatcher, and is flipped to `complete` exactly once by the
//! completion tracker, which also records `contact_count`. Starts are never
//! deleted by the dispatch pipeline.
//!
//! Every dispatch bumps `dispatch_generation`. Batches carry the generation
//! they were split under, and only batches of the current generation count
//! toward completion, so a resumed start never mixes two audience resolutions.
//!
//! ## Database Schema
//!
//! Maps to `flows_flowstart`:
//! ```sql
//! CREATE TABLE flows_flowstart (
//!   id BIGSERIAL PRIMARY KEY,
//!   uuid UUID NOT NULL UNIQUE,
//!   org_id BIGINT NOT NULL,
//!   flow_id BIGINT NOT NULL,
//!   flow_type TEXT NOT NULL,
//!   contact_ids BIGINT[] NOT NULL,
//!   group_ids BIGINT[] NOT NULL,
//!   query TEXT,
//!   restart_participants BOOLEAN NOT NULL,
//!   include_active BOOLEAN NOT NULL,
//!   extra JSONB,
//!   status TEXT NOT NULL DEFAULT 'pending',
//!   contact_count BIGINT,
//!   batch_count INTEGER,
//!   dispatch_generation INTEGER NOT NULL DEFAULT 0,
//!   -- ... timestamps
//! );
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::ids::{ContactId, FlowId, FlowStartId, GroupId, OrgId};

/// Status of a flow start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStartStatus {
    /// Inserted, possibly dispatched, not every batch has finished
    Pending,
    /// Every batch finished and the audience size was recorded
    Complete,
}

impl FlowStartStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Complete => "complete",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl fmt::Display for FlowStartStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FlowStartStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "complete" => Ok(Self::Complete),
            _ => Err(format!("Invalid flow start status: {s}")),
        }
    }
}

/// Kind of flow being started. Carried through to the flow runner untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    Messaging,
    Voice,
    Background,
}

impl FlowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Messaging => "messaging",
            Self::Voice => "voice",
            Self::Background => "background",
        }
    }
}

impl fmt::Display for FlowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FlowType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "messaging" => Ok(Self::Messaging),
            "voice" => Ok(Self::Voice),
            "background" => Ok(Self::Background),
            _ => Err(format!("Invalid flow type: {s}")),
        }
    }
}

/// A persisted flow start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowStart {
    pub id: FlowStartId,
    pub uuid: Uuid,
    pub org_id: OrgId,
    pub flow_id: FlowId,
    pub flow_type: FlowType,
    pub contact_ids: Vec<ContactId>,
    pub group_ids: Vec<GroupId>,
    pub query: Option<String>,
    pub restart_participants: bool,
    pub include_active: bool,
    pub extra: Option<serde_json::Value>,
    pub status: FlowStartStatus,
    /// Deduplicated audience size, set on completion
    pub contact_count: Option<i64>,
    /// Number of batches dispatched, set before the first enqueue
    pub batch_count: Option<i32>,
    /// Number of times the start was dispatched; zero until the first dispatch
    pub dispatch_generation: i32,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl FlowStart {
    /// Whether the start names at least one group
    pub fn has_groups(&self) -> bool {
        !self.group_ids.is_empty()
    }

    /// Whether the start names explicit contacts or a non-blank query
    pub fn has_contacts_or_query(&self) -> bool {
        !self.contact_ids.is_empty() || self.query().is_some()
    }

    /// The search query, ignoring blank strings
    pub fn query(&self) -> Option<&str> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
    }

    pub fn is_complete(&self) -> bool {
        self.status.is_terminal()
    }
}

/// New flow start for insertion (without generated fields)
///
/// ```rust
/// use flowstart_core::models::{ContactId, FlowId, FlowType, GroupId, NewFlowStart, OrgId};
///
/// let start = NewFlowStart::new(OrgId(1), FlowType::Messaging, FlowId(10), false, false)
///     .with_group_ids(vec![GroupId(3)])
///     .with_contact_ids(vec![ContactId(42)]);
/// assert_eq!(start.group_ids.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFlowStart {
    pub org_id: OrgId,
    pub flow_id: FlowId,
    pub flow_type: FlowType,
    pub contact_ids: Vec<ContactId>,
    pub group_ids: Vec<GroupId>,
    pub query: Option<String>,
    pub restart_participants: bool,
    pub include_active: bool,
    pub extra: Option<serde_json::Value>,
}

impl NewFlowStart {
    pub fn new(
        org_id: OrgId,
        flow_type: FlowType,
        flow_id: FlowId,
        restart_participants: bool,
        include_active: bool,
    ) -> Self {
        Self {
            org_id,
            flow_id,
            flow_type,
            contact_ids: Vec::new(),
            group_ids: Vec::new(),
            query: None,
            restart_participants,
            include_active,
            extra: None,
        }
    }

    pub fn with_contact_ids(mut self, contact_ids: impl Into<Vec<ContactId>>) -> Self {
        self.contact_ids = contact_ids.into();
        self
    }

    pub fn with_group_ids(mut self, group_ids: impl Into<Vec<GroupId>>) -> Self {
        self.group_ids = group_ids.into();
        self
    }

    /// Blank queries are treated as no query at all
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        let query = query.into();
        self.query = if query.trim().is_empty() {
            None
        } else {
            Some(query)
        };
        self
    }

    pub fn with_extra(mut self, extra: serde_json::Value) -> Self {
        self.extra = Some(extra);
        self
    }

    /// Materialize the persisted form with the generated id
    pub fn into_flow_start(self, id: FlowStartId, now: DateTime<Utc>) -> FlowStart {
        FlowStart {
            id,
            uuid: Uuid::new_v4(),
            org_id: self.org_id,
            flow_id: self.flow_id,
            flow_type: self.flow_type,
            contact_ids: self.contact_ids,
            group_ids: self.group_ids,
            query: self.query,
            restart_participants: self.restart_participants,
            include_active: self.include_active,
            extra: self.extra,
            status: FlowStartStatus::Pending,
            contact_count: None,
            batch_count: None,
            dispatch_generation: 0,
            created_at: now,
            modified_at: now,
        }
    }
}
