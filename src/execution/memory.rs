//! In-memory flow runner writing runs into a [`MemoryStore`].

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

use super::{FlowRunner, RunOutcome, RunRequest, RunnerError};
use crate::models::ContactId;
use crate::store::MemoryStore;

/// Runner whose runs stay active until superseded, like a flow that waits
/// for a reply. Individual contacts can be made to fail.
#[derive(Debug)]
pub struct MemoryFlowRunner {
    store: Arc<MemoryStore>,
    failing_contacts: Mutex<HashSet<ContactId>>,
    requests: Mutex<Vec<RunRequest>>,
}

impl MemoryFlowRunner {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            failing_contacts: Mutex::new(HashSet::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request for `contact_id` fails from now on
    pub fn fail_for(&self, contact_id: ContactId) {
        self.failing_contacts.lock().insert(contact_id);
    }

    pub fn requests(&self) -> Vec<RunRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl FlowRunner for MemoryFlowRunner {
    async fn create_or_restart_run(&self, request: RunRequest) -> Result<RunOutcome, RunnerError> {
        self.requests.lock().push(request.clone());

        if self.failing_contacts.lock().contains(&request.contact_id) {
            return Err(RunnerError::CreateFailed {
                contact_id: request.contact_id,
                message: "runner rejected contact".to_string(),
            });
        }

        Ok(self.store.start_run(
            request.contact_id,
            request.flow_id,
            Some(request.start_id),
            request.restart,
        ))
    }
}
