//! Canned search results, paged from memory.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use super::{ContactSearch, SearchError, SearchPage};
use crate::models::{ContactId, OrgId};

/// Search collaborator that answers from registered query → ids mappings
///
/// Unknown queries match nothing. Every call is recorded so tests can assert
/// how the resolver scrolled. Results can be swapped while shared, to model
/// an index that changed between two resolutions.
#[derive(Debug)]
pub struct StaticSearch {
    results: Mutex<HashMap<String, Vec<ContactId>>>,
    page_size: usize,
    failure: Option<SearchError>,
    calls: Mutex<Vec<(String, Option<String>)>>,
}

impl Default for StaticSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticSearch {
    pub fn new() -> Self {
        Self {
            results: Mutex::new(HashMap::new()),
            page_size: 100,
            failure: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_results(self, query: impl Into<String>, contact_ids: Vec<ContactId>) -> Self {
        self.set_results(query, contact_ids);
        self
    }

    /// Replace what `query` matches from now on
    pub fn set_results(&self, query: impl Into<String>, contact_ids: Vec<ContactId>) {
        self.results.lock().insert(query.into(), contact_ids);
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Every search fails with `error`
    pub fn failing(error: SearchError) -> Self {
        Self {
            failure: Some(error),
            ..Self::new()
        }
    }

    /// `(query, cursor)` of every call so far
    pub fn calls(&self) -> Vec<(String, Option<String>)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ContactSearch for StaticSearch {
    async fn search(
        &self,
        _org_id: OrgId,
        query: &str,
        cursor: Option<&str>,
    ) -> Result<SearchPage, SearchError> {
        self.calls
            .lock()
            .push((query.to_string(), cursor.map(str::to_string)));

        if let Some(error) = &self.failure {
            return Err(error.clone());
        }

        let offset = match cursor {
            None => 0,
            Some(token) => token.parse::<usize>().map_err(|_| SearchError::InvalidQuery {
                query: query.to_string(),
                message: format!("bad cursor {token}"),
            })?,
        };

        let page: Vec<ContactId> = self
            .results
            .lock()
            .get(query)
            .map(|hits| hits.iter().skip(offset).take(self.page_size).copied().collect())
            .unwrap_or_default();
        let next = offset + page.len();

        Ok(SearchPage {
            contact_ids: page,
            cursor: Some(next.to_string()),
        })
    }
}
