//! # PostgreSQL Contact Search
//!
//! Case-insensitive name match over `contacts_contact`, scrolled by keyset on
//! the contact id. The cursor is the last id of the previous page.

use async_trait::async_trait;
use sqlx::PgPool;

use super::{ContactSearch, SearchError, SearchPage};
use crate::models::{ContactId, OrgId};

#[derive(Debug, Clone)]
pub struct PgContactSearch {
    pool: PgPool,
    page_size: i64,
}

impl PgContactSearch {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            page_size: 500,
        }
    }

    pub fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

/// Escape LIKE wildcards so the query matches literally
fn like_pattern(query: &str) -> String {
    let escaped = query
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[async_trait]
impl ContactSearch for PgContactSearch {
    async fn search(
        &self,
        org_id: OrgId,
        query: &str,
        cursor: Option<&str>,
    ) -> Result<SearchPage, SearchError> {
        let after: i64 = match cursor {
            None => 0,
            Some(token) => token.parse().map_err(|_| SearchError::InvalidQuery {
                query: query.to_string(),
                message: format!("bad cursor {token}"),
            })?,
        };

        let contact_ids: Vec<ContactId> = sqlx::query_scalar(
            r#"
            SELECT id FROM contacts_contact
            WHERE org_id = $1 AND is_active AND name ILIKE $2 AND id > $3
            ORDER BY id
            LIMIT $4
            "#,
        )
        .bind(org_id)
        .bind(like_pattern(query))
        .bind(after)
        .bind(self.page_size)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SearchError::Backend(e.to_string()))?;

        let cursor = contact_ids
            .last()
            .map(|id| id.to_string())
            .or_else(|| cursor.map(str::to_string));

        Ok(SearchPage {
            contact_ids,
            cursor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("bob"), "%bob%");
        assert_eq!(like_pattern(" 100%_ "), "%100\\%\\_%");
    }
}
