//! # Identifier Types
//!
//! Strongly typed row identifiers. Each wraps the `BIGINT` primary key of its
//! table so contact, group, flow and start ids cannot be mixed up at call sites.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
        )]
        #[serde(transparent)]
        #[sqlx(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn as_i64(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

row_id!(
    /// Organization owning flows, contacts and starts
    OrgId
);
row_id!(
    /// A contact that can be placed in a flow
    ContactId
);
row_id!(
    /// A contact group
    GroupId
);
row_id!(
    /// A flow definition
    FlowId
);
row_id!(
    /// A flow start request
    FlowStartId
);
row_id!(FlowRunId);
