//! # Queue Classifier
//!
//! Picks the dispatch lane from the shape of a start's targeting, before any
//! audience is resolved. Starts naming groups can fan out to arbitrarily many
//! contacts and go to the bulk lane; hand-picked contacts and queries go to
//! the direct lane so they are not stuck behind large broadcasts.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::QueueConfig;
use crate::models::FlowStart;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchQueue {
    Direct,
    Bulk,
}

impl DispatchQueue {
    /// Configured queue name for this lane
    pub fn queue_name<'a>(&self, queues: &'a QueueConfig) -> &'a str {
        match self {
            Self::Direct => &queues.direct,
            Self::Bulk => &queues.bulk,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Bulk => "bulk",
        }
    }
}

impl fmt::Display for DispatchQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn classify(start: &FlowStart) -> DispatchQueue {
    if start.has_groups() {
        DispatchQueue::Bulk
    } else if start.has_contacts_or_query() {
        DispatchQueue::Direct
    } else {
        DispatchQueue::Bulk
    }
}
