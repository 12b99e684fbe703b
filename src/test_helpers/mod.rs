//! # Test Helpers
//!
//! Fixture builders and an in-memory harness for unit and integration tests.

pub mod fixtures;

pub use fixtures::{create_contacts, create_org_fixtures, search_by_name, MemoryHarness, OrgFixtures, DOCTORS_GROUP_SIZE};
