//! # In-Memory Store
//!
//! A single mutex guards every table, so completion checks and run writes are
//! serialized the same way row locks serialize them in PostgreSQL. Besides the
//! [`StartStore`] contract it exposes the writes fixtures and the in-memory
//! flow runner need: contacts, groups and runs.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::debug;
use uuid::Uuid;

use super::{CompletionOutcome, StartStore};
use crate::error::{FlowStartError, Result};
use crate::execution::RunOutcome;
use crate::models::{
    Contact, ContactGroup, ContactId, FlowId, FlowRun, FlowRunId, FlowStart, FlowStartId,
    FlowStartStatus, GroupId, NewFlowStart, OrgId,
};

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    starts: HashMap<FlowStartId, FlowStart>,
    finished_batches: HashMap<FlowStartId, BTreeSet<u32>>,
    contacts: BTreeMap<ContactId, Contact>,
    groups: HashMap<GroupId, ContactGroup>,
    members: HashMap<GroupId, BTreeSet<ContactId>>,
    runs: Vec<FlowRun>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_contact(&self, org_id: OrgId, name: impl Into<String>) -> Contact {
        let mut state = self.state.lock();
        let contact = Contact {
            id: ContactId(state.next_id()),
            org_id,
            name: name.into(),
            is_active: true,
        };
        state.contacts.insert(contact.id, contact.clone());
        contact
    }

    pub fn create_group(&self, org_id: OrgId, name: impl Into<String>) -> ContactGroup {
        let mut state = self.state.lock();
        let group = ContactGroup {
            id: GroupId(state.next_id()),
            org_id,
            name: name.into(),
        };
        state.groups.insert(group.id, group.clone());
        group
    }

    pub fn add_to_group(&self, group_id: GroupId, contact_ids: &[ContactId]) {
        self.state
            .lock()
            .members
            .entry(group_id)
            .or_default()
            .extend(contact_ids.iter().copied());
    }

    /// Insert a run directly, bypassing any flow runner
    pub fn insert_run(
        &self,
        contact_id: ContactId,
        flow_id: FlowId,
        start_id: Option<FlowStartId>,
        is_active: bool,
    ) -> FlowRun {
        let mut state = self.state.lock();
        Self::push_run(&mut state, contact_id, flow_id, start_id, is_active)
    }

    /// Create a run attributed to `start_id` unless one already exists.
    ///
    /// With `restart`, active runs of the contact in `flow_id` are deactivated
    /// first. Without it, an active run in `flow_id` leaves everything as is
    /// and is returned as [`RunOutcome::ActiveInFlow`].
    pub fn start_run(
        &self,
        contact_id: ContactId,
        flow_id: FlowId,
        start_id: Option<FlowStartId>,
        restart: bool,
    ) -> RunOutcome {
        let mut state = self.state.lock();

        if let Some(start_id) = start_id {
            if let Some(existing) = state
                .runs
                .iter()
                .find(|run| run.contact_id == contact_id && run.belongs_to_start(start_id))
            {
                return RunOutcome::AlreadyStarted(existing.clone());
            }
        }

        if !restart {
            if let Some(active) = state
                .runs
                .iter()
                .find(|run| run.contact_id == contact_id && run.is_active_in(flow_id))
            {
                return RunOutcome::ActiveInFlow(active.clone());
            }
        }

        let now = Utc::now();
        for run in state
            .runs
            .iter_mut()
            .filter(|run| run.contact_id == contact_id && run.is_active_in(flow_id))
        {
            run.is_active = false;
            run.modified_at = now;
        }

        RunOutcome::Created(Self::push_run(&mut state, contact_id, flow_id, start_id, true))
    }

    /// Every run, in creation order
    pub fn runs(&self) -> Vec<FlowRun> {
        self.state.lock().runs.clone()
    }

    fn push_run(
        state: &mut MemoryState,
        contact_id: ContactId,
        flow_id: FlowId,
        start_id: Option<FlowStartId>,
        is_active: bool,
    ) -> FlowRun {
        let now = Utc::now();
        let run = FlowRun {
            id: FlowRunId(state.next_id()),
            uuid: Uuid::new_v4(),
            contact_id,
            flow_id,
            start_id,
            is_active,
            created_at: now,
            modified_at: now,
        };
        state.runs.push(run.clone());
        run
    }

    fn complete(start: &mut FlowStart, contact_count: i64) {
        start.status = FlowStartStatus::Complete;
        start.contact_count = Some(contact_count);
        start.modified_at = Utc::now();
    }
}

#[async_trait]
impl StartStore for MemoryStore {
    async fn insert_flow_start(&self, new_start: NewFlowStart) -> Result<FlowStart> {
        let mut state = self.state.lock();
        let id = FlowStartId(state.next_id());
        let start = new_start.into_flow_start(id, Utc::now());
        state.starts.insert(id, start.clone());
        Ok(start)
    }

    async fn find_flow_start(&self, start_id: FlowStartId) -> Result<Option<FlowStart>> {
        Ok(self.state.lock().starts.get(&start_id).cloned())
    }

    async fn group_contact_ids(&self, org_id: OrgId, group_ids: &[GroupId]) -> Result<Vec<ContactId>> {
        let state = self.state.lock();
        let mut contact_ids = Vec::new();

        for group_id in group_ids {
            let in_org = state
                .groups
                .get(group_id)
                .is_some_and(|group| group.org_id == org_id);
            if !in_org {
                continue;
            }

            let Some(members) = state.members.get(group_id) else {
                continue;
            };
            contact_ids.extend(members.iter().copied().filter(|id| {
                state
                    .contacts
                    .get(id)
                    .is_some_and(|contact| contact.is_active)
            }));
        }

        Ok(contact_ids)
    }

    async fn active_runs_for_contacts(&self, contact_ids: &[ContactId]) -> Result<Vec<FlowRun>> {
        let wanted: HashSet<ContactId> = contact_ids.iter().copied().collect();
        Ok(self
            .state
            .lock()
            .runs
            .iter()
            .filter(|run| run.is_active && wanted.contains(&run.contact_id))
            .cloned()
            .collect())
    }

    async fn contacts_with_start_runs(
        &self,
        start_id: FlowStartId,
        contact_ids: &[ContactId],
    ) -> Result<Vec<ContactId>> {
        let started: HashSet<ContactId> = self
            .state
            .lock()
            .runs
            .iter()
            .filter(|run| run.belongs_to_start(start_id))
            .map(|run| run.contact_id)
            .collect();

        Ok(contact_ids
            .iter()
            .copied()
            .filter(|id| started.contains(id))
            .collect())
    }

    async fn runs_for_start(&self, start_id: FlowStartId) -> Result<Vec<FlowRun>> {
        Ok(self
            .state
            .lock()
            .runs
            .iter()
            .filter(|run| run.belongs_to_start(start_id))
            .cloned()
            .collect())
    }

    async fn begin_dispatch(&self, start_id: FlowStartId, batch_count: u32) -> Result<Option<u32>> {
        let mut state = self.state.lock();
        let state = &mut *state;
        let start = state
            .starts
            .get_mut(&start_id)
            .ok_or(FlowStartError::StartNotFound(start_id))?;

        if start.is_complete() {
            return Ok(None);
        }

        start.batch_count = Some(batch_count as i32);
        start.dispatch_generation += 1;
        start.modified_at = Utc::now();
        state.finished_batches.remove(&start_id);
        Ok(Some(start.dispatch_generation as u32))
    }

    async fn record_batch_done(
        &self,
        start_id: FlowStartId,
        generation: u32,
        batch_index: u32,
        contact_count: i64,
    ) -> Result<CompletionOutcome> {
        let mut state = self.state.lock();
        let state = &mut *state;

        let start = state
            .starts
            .get_mut(&start_id)
            .ok_or(FlowStartError::StartNotFound(start_id))?;
        if start.is_complete() {
            return Ok(CompletionOutcome::AlreadyComplete);
        }

        let current = start.dispatch_generation.max(0) as u32;
        if generation != current {
            return Ok(CompletionOutcome::Superseded { generation, current });
        }

        let finished = state.finished_batches.entry(start_id).or_default();
        finished.insert(batch_index);
        let batches_done = finished.len() as u32;
        let batch_count = start.batch_count.unwrap_or(i32::MAX).max(0) as u32;

        if batches_done < batch_count {
            debug!(
                start_id = start_id.as_i64(),
                batches_done = batches_done,
                batch_count = batch_count,
                "Batch recorded, start still pending"
            );
            return Ok(CompletionOutcome::Pending {
                batches_done,
                batch_count,
            });
        }

        Self::complete(start, contact_count);
        Ok(CompletionOutcome::Completed { contact_count })
    }

    async fn complete_empty(&self, start_id: FlowStartId) -> Result<CompletionOutcome> {
        let mut state = self.state.lock();
        let start = state
            .starts
            .get_mut(&start_id)
            .ok_or(FlowStartError::StartNotFound(start_id))?;

        if start.is_complete() {
            return Ok(CompletionOutcome::AlreadyComplete);
        }

        start.batch_count = Some(0);
        Self::complete(start, 0);
        Ok(CompletionOutcome::Completed { contact_count: 0 })
    }
}
