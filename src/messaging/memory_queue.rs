//! # In-Memory Task Queue
//!
//! FIFO lanes keyed by queue name. Used by tests and single-process
//! deployments; supports failing pushes on demand to exercise dispatch errors.
//!
//! Popped tasks move to a lease table until they are deleted or released.
//! Expired leases are returned to the front of their lane on the next pop;
//! [`MemoryTaskQueue::expire_leases`] does the same immediately, standing in
//! for a consumer that died without acknowledging.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

use super::errors::{QueueError, QueueResult};
use super::message::QueuedTask;
use super::task_queue::TaskQueue;
use crate::constants::DEFAULT_VISIBILITY_TIMEOUT_SECONDS;

#[derive(Debug, Clone)]
struct Lease {
    task: QueuedTask,
    visible_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct MemoryTaskQueue {
    lanes: DashMap<String, VecDeque<QueuedTask>>,
    leases: DashMap<i64, Lease>,
    next_id: AtomicI64,
    visibility_timeout: Duration,
    /// Pushes still allowed before the queue reports itself unavailable
    push_budget: Option<AtomicUsize>,
}

impl Default for MemoryTaskQueue {
    fn default() -> Self {
        Self {
            lanes: DashMap::new(),
            leases: DashMap::new(),
            next_id: AtomicI64::new(0),
            visibility_timeout: Duration::from_secs(DEFAULT_VISIBILITY_TIMEOUT_SECONDS),
            push_budget: None,
        }
    }
}

impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `limit` pushes, then fail every further push
    pub fn with_push_limit(limit: usize) -> Self {
        Self {
            push_budget: Some(AtomicUsize::new(limit)),
            ..Self::default()
        }
    }

    pub fn with_visibility_timeout(mut self, visibility_timeout: Duration) -> Self {
        self.visibility_timeout = visibility_timeout;
        self
    }

    /// Allow `count` more pushes on a limited queue
    pub fn grant_pushes(&self, count: usize) {
        if let Some(budget) = &self.push_budget {
            budget.fetch_add(count, Ordering::SeqCst);
        }
    }

    /// Snapshot of tasks waiting on `queue`, oldest first
    pub fn pending(&self, queue: &str) -> Vec<QueuedTask> {
        self.lanes
            .get(queue)
            .map(|lane| lane.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Tasks of `queue` popped but neither deleted nor released
    pub fn leased(&self, queue: &str) -> Vec<QueuedTask> {
        let mut leased: Vec<QueuedTask> = self
            .leases
            .iter()
            .filter(|lease| lease.task.queue == queue)
            .map(|lease| lease.task.clone())
            .collect();
        leased.sort_by_key(|task| task.id);
        leased
    }

    /// Make every leased task visible again, as if its consumer had died
    pub fn expire_leases(&self) -> usize {
        let ids: Vec<i64> = self.leases.iter().map(|lease| *lease.key()).collect();
        self.return_to_lanes(ids)
    }

    fn take_push_permit(&self) -> bool {
        match &self.push_budget {
            None => true,
            Some(budget) => budget
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok(),
        }
    }

    fn reclaim_expired(&self, queue: &str, now: DateTime<Utc>) {
        let expired: Vec<i64> = self
            .leases
            .iter()
            .filter(|lease| lease.task.queue == queue && lease.visible_at <= now)
            .map(|lease| *lease.key())
            .collect();
        self.return_to_lanes(expired);
    }

    /// Put leased tasks back at the front of their lanes, oldest first
    fn return_to_lanes(&self, ids: Vec<i64>) -> usize {
        let mut returned: Vec<QueuedTask> = ids
            .into_iter()
            .filter_map(|id| self.leases.remove(&id).map(|(_, lease)| lease.task))
            .collect();
        returned.sort_by_key(|task| std::cmp::Reverse(task.id));

        let count = returned.len();
        for task in returned {
            debug!(queue = %task.queue, task_id = task.id, "Lease expired, task visible again");
            self.lanes.entry(task.queue.clone()).or_default().push_front(task);
        }
        count
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn push(
        &self,
        queue: &str,
        task_type: &str,
        payload: serde_json::Value,
    ) -> QueueResult<i64> {
        if !self.take_push_permit() {
            return Err(QueueError::unavailable(queue));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let task = QueuedTask {
            id,
            queue: queue.to_string(),
            task_type: task_type.to_string(),
            payload,
            read_count: 0,
            enqueued_at: Utc::now(),
        };
        self.lanes.entry(queue.to_string()).or_default().push_back(task);

        debug!(queue = %queue, task_id = id, task_type = %task_type, "Task pushed");
        Ok(id)
    }

    async fn pop(&self, queue: &str) -> QueueResult<Option<QueuedTask>> {
        let now = Utc::now();
        self.reclaim_expired(queue, now);

        let Some(mut task) = self.lanes.get_mut(queue).and_then(|mut lane| lane.pop_front()) else {
            return Ok(None);
        };
        task.read_count += 1;

        let lease = chrono::Duration::from_std(self.visibility_timeout)
            .map_err(|e| QueueError::queue_operation(queue, "pop", e.to_string()))?;
        self.leases.insert(
            task.id,
            Lease {
                task: task.clone(),
                visible_at: now + lease,
            },
        );
        Ok(Some(task))
    }

    async fn delete(&self, queue: &str, task_id: i64) -> QueueResult<()> {
        if self.leases.remove(&task_id).is_none() {
            if let Some(mut lane) = self.lanes.get_mut(queue) {
                lane.retain(|task| task.id != task_id);
            }
        }
        Ok(())
    }

    async fn release(&self, _queue: &str, task_id: i64) -> QueueResult<()> {
        self.return_to_lanes(vec![task_id]);
        Ok(())
    }

    async fn size(&self, queue: &str) -> QueueResult<u64> {
        let waiting = self.lanes.get(queue).map(|lane| lane.len()).unwrap_or(0);
        let leased = self
            .leases
            .iter()
            .filter(|lease| lease.task.queue == queue)
            .count();
        Ok((waiting + leased) as u64)
    }
}
