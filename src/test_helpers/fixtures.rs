//! # Fixtures
//!
//! Explicit fixture builders over a [`MemoryStore`]. Every function takes the
//! store it writes to; nothing is global.

use std::sync::Arc;

use crate::config::FlowStartConfig;
use crate::execution::MemoryFlowRunner;
use crate::messaging::MemoryTaskQueue;
use crate::models::{Contact, ContactGroup, FlowId, OrgId};
use crate::orchestration::{BatchWorker, BatchWorkerPool, FlowStartService};
use crate::search::StaticSearch;
use crate::store::MemoryStore;

pub const DOCTORS_GROUP_SIZE: usize = 121;

/// A small organization: a 121-member "Doctors" group, Cathy inside it, Bob
/// and George outside it, and one messaging flow.
#[derive(Debug, Clone)]
pub struct OrgFixtures {
    pub org_id: OrgId,
    pub flow_id: FlowId,
    pub doctors: ContactGroup,
    pub cathy: Contact,
    pub bob: Contact,
    pub george: Contact,
}

/// Populate `store` with [`OrgFixtures`] for `org_id`
pub fn create_org_fixtures(store: &MemoryStore, org_id: OrgId) -> OrgFixtures {
    let cathy = store.create_contact(org_id, "Cathy");
    let bob = store.create_contact(org_id, "Bob");
    let george = store.create_contact(org_id, "George");

    let doctors = store.create_group(org_id, "Doctors");
    let mut members = vec![cathy.id];
    members.extend(create_contacts(store, org_id, "Doctor", DOCTORS_GROUP_SIZE - 1).iter().map(|c| c.id));
    store.add_to_group(doctors.id, &members);

    OrgFixtures {
        org_id,
        flow_id: FlowId(1_000 + org_id.as_i64()),
        doctors,
        cathy,
        bob,
        george,
    }
}

/// `count` contacts named `{prefix} {n}`
pub fn create_contacts(store: &MemoryStore, org_id: OrgId, prefix: &str, count: usize) -> Vec<Contact> {
    (1..=count)
        .map(|n| store.create_contact(org_id, format!("{prefix} {n}")))
        .collect()
}

/// A search index answering `query` with those of `contacts` whose name
/// contains it, case-insensitively
pub fn search_by_name(contacts: &[Contact], query: &str) -> StaticSearch {
    let needle = query.to_lowercase();
    let hits = contacts
        .iter()
        .filter(|contact| contact.name.to_lowercase().contains(&needle))
        .map(|contact| contact.id)
        .collect();
    StaticSearch::new().with_results(query, hits)
}

/// The whole pipeline wired over in-memory backends
pub struct MemoryHarness {
    pub store: Arc<MemoryStore>,
    pub queue: Arc<MemoryTaskQueue>,
    pub runner: Arc<MemoryFlowRunner>,
    pub search: Arc<StaticSearch>,
    pub service: FlowStartService,
    pub pool: BatchWorkerPool,
    pub config: FlowStartConfig,
}

impl MemoryHarness {
    pub fn new(store: Arc<MemoryStore>, search: StaticSearch) -> Self {
        Self::with_queue(store, search, Arc::new(MemoryTaskQueue::new()), FlowStartConfig::default())
    }

    pub fn with_queue(
        store: Arc<MemoryStore>,
        search: StaticSearch,
        queue: Arc<MemoryTaskQueue>,
        config: FlowStartConfig,
    ) -> Self {
        let runner = Arc::new(MemoryFlowRunner::new(store.clone()));
        let search = Arc::new(search);
        let service = FlowStartService::new(store.clone(), search.clone(), queue.clone(), &config);
        let worker = Arc::new(BatchWorker::new(store.clone(), runner.clone()));
        let pool = BatchWorkerPool::new(queue.clone(), worker, &config);
        Self {
            store,
            queue,
            runner,
            search,
            service,
            pool,
            config,
        }
    }

    /// Drain both lanes, direct first
    pub async fn drain(&self) -> crate::error::Result<usize> {
        let direct = self.pool.drain(&self.config.queues.direct).await?;
        let bulk = self.pool.drain(&self.config.queues.bulk).await?;
        Ok(direct + bulk)
    }
}
