//! # System Constants
//!
//! Queue names, task discriminators and sizing defaults shared by the
//! dispatcher, the worker pool and configuration.

/// Task type of a queued [`FlowStartBatch`](crate::models::FlowStartBatch)
pub const START_FLOW_BATCH_TASK: &str = "start_flow_batch";

/// Latency-sensitive lane for small, caller-anticipated audiences
pub const DEFAULT_DIRECT_QUEUE: &str = "direct";

/// Throughput lane for group and org-wide audiences
pub const DEFAULT_BULK_QUEUE: &str = "bulk";

pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

pub const DEFAULT_MAX_SEARCH_PAGES: usize = 10_000;

/// How long a popped task stays invisible before it is delivered again
pub const DEFAULT_VISIBILITY_TIMEOUT_SECONDS: u64 = 300;

/// Operations recorded by [`crate::logging`]
pub mod operations {
    pub const RESOLVE: &str = "resolve";
    pub const CLASSIFY: &str = "classify";
    pub const DISPATCH: &str = "dispatch";
    pub const PROCESS_BATCH: &str = "process_batch";
    pub const COMPLETE: &str = "complete";
}
