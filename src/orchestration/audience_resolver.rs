//! # Audience Resolver
//!
//! Turns a start's targeting criteria into the deduplicated, ordered list of
//! contacts it addresses: explicit contacts first, then group members, then
//! search hits. Any collaborator failure aborts the whole resolution so a
//! partial audience is never dispatched.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::error::{FlowStartError, Result};
use crate::models::{ContactId, FlowStart};
use crate::search::ContactSearch;
use crate::store::StartStore;

pub struct AudienceResolver {
    store: Arc<dyn StartStore>,
    search: Arc<dyn ContactSearch>,
    max_pages: usize,
}

impl AudienceResolver {
    pub fn new(store: Arc<dyn StartStore>, search: Arc<dyn ContactSearch>, max_pages: usize) -> Self {
        Self {
            store,
            search,
            max_pages,
        }
    }

    #[instrument(skip(self, start), fields(start_id = start.id.as_i64()))]
    pub async fn resolve(&self, start: &FlowStart) -> Result<Vec<ContactId>> {
        let mut audience = Audience::default();
        audience.extend(start.contact_ids.iter().copied());

        if start.has_groups() {
            let members = self
                .store
                .group_contact_ids(start.org_id, &start.group_ids)
                .await
                .map_err(|e| {
                    FlowStartError::resolution(start.id, format!("group lookup failed: {e}"))
                })?;
            debug!(groups = start.group_ids.len(), members = members.len(), "Resolved group members");
            audience.extend(members);
        }

        if let Some(query) = start.query() {
            let hits = self.scroll_query(start, query).await?;
            debug!(query = %query, hits = hits.len(), "Resolved search query");
            audience.extend(hits);
        }

        Ok(audience.into_contact_ids())
    }

    /// Page through the search collaborator until an empty page
    async fn scroll_query(&self, start: &FlowStart, query: &str) -> Result<Vec<ContactId>> {
        let mut hits = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..self.max_pages {
            let page = self
                .search
                .search(start.org_id, query, cursor.as_deref())
                .await
                .map_err(|e| {
                    warn!(start_id = start.id.as_i64(), error = %e, "Search failed during resolution");
                    FlowStartError::resolution(start.id, format!("search failed: {e}"))
                })?;

            if page.is_empty() {
                return Ok(hits);
            }
            hits.extend(page.contact_ids);
            cursor = page.cursor;
        }

        Err(FlowStartError::resolution(
            start.id,
            format!("search for '{query}' exceeded {} pages", self.max_pages),
        ))
    }
}

/// Insertion-ordered set of contact ids
#[derive(Debug, Default)]
struct Audience {
    seen: HashSet<ContactId>,
    ordered: Vec<ContactId>,
}

impl Audience {
    fn extend(&mut self, contact_ids: impl IntoIterator<Item = ContactId>) {
        for contact_id in contact_ids {
            if self.seen.insert(contact_id) {
                self.ordered.push(contact_id);
            }
        }
    }

    fn into_contact_ids(self) -> Vec<ContactId> {
        self.ordered
    }
}
