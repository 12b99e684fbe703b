//! # Contact Search
//!
//! Scrolling query contract used by the audience resolver to turn a free-text
//! query into contact ids. A page carries the ids plus an opaque cursor for
//! the next call; an empty page means the scroll is exhausted.

pub mod pg_search;
pub mod static_search;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{ContactId, OrgId};

pub use pg_search::PgContactSearch;
pub use static_search::StaticSearch;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SearchError {
    #[error("Search query rejected: {query}: {message}")]
    InvalidQuery { query: String, message: String },

    #[error("Search backend error: {0}")]
    Backend(String),

    #[error("Search page timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// One page of a scrolling search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    pub contact_ids: Vec<ContactId>,
    /// Token to request the following page
    pub cursor: Option<String>,
}

impl SearchPage {
    pub fn is_empty(&self) -> bool {
        self.contact_ids.is_empty()
    }
}

#[async_trait]
pub trait ContactSearch: Send + Sync {
    /// Fetch the page after `cursor` (the first page when `None`)
    async fn search(
        &self,
        org_id: OrgId,
        query: &str,
        cursor: Option<&str>,
    ) -> Result<SearchPage, SearchError>;
}
