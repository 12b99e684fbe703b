//! # Batch Worker Pool
//!
//! Runs `worker.concurrency` polling loops against the task queue. Each loop
//! pops from the direct lane before the bulk lane, hands `start_flow_batch`
//! tasks to the shared [`BatchWorker`] and sleeps for the poll interval when
//! both lanes are empty.
//!
//! Every popped task is leased. Once handled it is deleted from the queue;
//! tasks that can never succeed (unknown type, unreadable payload, missing
//! start) are logged and deleted as well. Tasks that failed on a database
//! error are released for another worker to retry. A task whose worker dies
//! before either happens is redelivered when its lease runs out.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::{FlowStartConfig, QueueConfig, WorkerConfig};
use crate::error::{FlowStartError, Result};
use crate::messaging::{QueuedTask, TaskQueue};

use super::batch_worker::{BatchReport, BatchWorker};

/// What the pool did with a popped task
#[derive(Debug, Clone, PartialEq)]
pub enum TaskDisposition {
    Processed(BatchReport),
    Dropped,
    Requeued,
}

#[derive(Clone)]
pub struct BatchWorkerPool {
    queue: Arc<dyn TaskQueue>,
    worker: Arc<BatchWorker>,
    queues: QueueConfig,
    config: WorkerConfig,
}

impl BatchWorkerPool {
    pub fn new(queue: Arc<dyn TaskQueue>, worker: Arc<BatchWorker>, config: &FlowStartConfig) -> Self {
        Self {
            queue,
            worker,
            queues: config.queues.clone(),
            config: config.worker.clone(),
        }
    }

    /// Lanes in polling priority order
    fn lanes(&self) -> [&str; 2] {
        [&self.queues.direct, &self.queues.bulk]
    }

    /// Pop and handle at most one task, direct lane first
    pub async fn poll_once(&self) -> Result<Option<TaskDisposition>> {
        for lane in self.lanes() {
            if let Some(task) = self.pop(lane).await? {
                return Ok(Some(self.handle_task(task).await));
            }
        }
        Ok(None)
    }

    /// Process `queue` until it is empty, returning how many tasks were taken
    pub async fn drain(&self, queue: &str) -> Result<usize> {
        let mut taken = 0;
        while let Some(task) = self.pop(queue).await? {
            self.handle_task(task).await;
            taken += 1;
        }
        debug!(queue = queue, tasks = taken, "Queue drained");
        Ok(taken)
    }

    /// Handle one leased task, then delete or release it
    pub async fn handle_task(&self, task: QueuedTask) -> TaskDisposition {
        let disposition = self.dispose(&task).await;

        let acknowledged = match disposition {
            TaskDisposition::Requeued => self.queue.release(&task.queue, task.id).await,
            TaskDisposition::Processed(_) | TaskDisposition::Dropped => {
                self.queue.delete(&task.queue, task.id).await
            }
        };
        if let Err(e) = acknowledged {
            warn!(
                task_id = task.id,
                queue = %task.queue,
                error = %e,
                "Failed to acknowledge task, it is redelivered when its lease expires"
            );
        }

        disposition
    }

    async fn dispose(&self, task: &QueuedTask) -> TaskDisposition {
        if !task.is_start_flow_batch() {
            warn!(
                task_id = task.id,
                queue = %task.queue,
                task_type = %task.task_type,
                "Dropping task of unknown type"
            );
            return TaskDisposition::Dropped;
        }

        match self.worker.process_task(task).await {
            Ok(report) => TaskDisposition::Processed(report),
            Err(FlowStartError::Database(message)) => {
                warn!(
                    task_id = task.id,
                    queue = %task.queue,
                    read_count = task.read_count,
                    error = %message,
                    "Batch failed on database error, releasing for retry"
                );
                TaskDisposition::Requeued
            }
            Err(e) => {
                error!(task_id = task.id, queue = %task.queue, error = %e, "Dropping unprocessable batch task");
                TaskDisposition::Dropped
            }
        }
    }

    /// Run the polling loops until `shutdown` turns true or its sender is dropped
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            concurrency = self.config.concurrency,
            direct = %self.queues.direct,
            bulk = %self.queues.bulk,
            "Starting batch worker pool"
        );

        let handles: Vec<_> = (0..self.config.concurrency)
            .map(|worker_id| {
                let pool = self.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { pool.poll_loop(worker_id, shutdown).await })
            })
            .collect();

        for result in futures::future::join_all(handles).await {
            result.map_err(|e| FlowStartError::worker(format!("polling task failed: {e}")))?;
        }

        info!("Batch worker pool stopped");
        Ok(())
    }

    async fn poll_loop(&self, worker_id: usize, mut shutdown: watch::Receiver<bool>) {
        debug!(worker_id = worker_id, "Polling loop started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.poll_once().await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => warn!(worker_id = worker_id, error = %e, "Queue poll failed"),
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
            }
        }

        debug!(worker_id = worker_id, "Polling loop stopped");
    }

    async fn pop(&self, lane: &str) -> Result<Option<QueuedTask>> {
        self.queue
            .pop(lane)
            .await
            .map_err(|e| FlowStartError::worker(format!("pop from {lane} failed: {e}")))
    }
}
