//! # Contact and Group Models
//!
//! Only the fields audience resolution needs: identity, owning org, the name
//! searched by [`PgContactSearch`](crate::search::PgContactSearch) and group
//! membership.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::ids::{ContactId, GroupId, OrgId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Contact {
    pub id: ContactId,
    pub org_id: OrgId,
    pub name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ContactGroup {
    pub id: GroupId,
    pub org_id: OrgId,
    pub name: String,
}
