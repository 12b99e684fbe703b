//! Pipeline tests over in-memory backends

pub mod concurrency_test;
pub mod failure_recovery_test;
pub mod flow_start_scenarios_test;
