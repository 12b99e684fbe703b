//! # Dispatch Orchestration
//!
//! The flow-start pipeline, leaves first:
//!
//! - [`audience_resolver`] - targeting criteria to an ordered, deduplicated audience
//! - [`queue_classifier`] - direct or bulk lane from the targeting shape
//! - [`batch_splitter`] - bounded, contiguous batches
//! - [`batch_dispatcher`] - durable batch count, then one task per batch
//! - [`batch_worker`] - eligibility and run creation for one batch
//! - [`completion_tracker`] - exactly-once completion of a start
//! - [`flow_start_service`] - caller-facing entry point
//! - [`worker_pool`] - polling loops feeding the batch worker

pub mod audience_resolver;
pub mod batch_dispatcher;
pub mod batch_splitter;
pub mod batch_worker;
pub mod completion_tracker;
pub mod flow_start_service;
pub mod queue_classifier;
pub mod worker_pool;

pub use audience_resolver::AudienceResolver;
pub use batch_dispatcher::BatchDispatcher;
pub use batch_splitter::{batch_count, split_into_batches};
pub use batch_worker::{evaluate_eligibility, BatchReport, BatchWorker, Eligibility};
pub use completion_tracker::CompletionTracker;
pub use flow_start_service::{DispatchOutcome, FlowStartService};
pub use queue_classifier::{classify, DispatchQueue};
pub use worker_pool::{BatchWorkerPool, TaskDisposition};
