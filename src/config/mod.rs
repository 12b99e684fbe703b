//! # Flow Start Configuration
//!
//! Settings for the dispatch pipeline and its worker pool.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use flowstart_core::config::FlowStartConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // defaults, then config/flowstart.{toml,yaml}, then FLOWSTART__* variables
//! let config = FlowStartConfig::load(None)?;
//!
//! let batch_size = config.dispatch.max_batch_size;
//! let bulk_queue = &config.queues.bulk;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{
    DEFAULT_BULK_QUEUE, DEFAULT_DIRECT_QUEUE, DEFAULT_MAX_BATCH_SIZE, DEFAULT_MAX_SEARCH_PAGES,
    DEFAULT_VISIBILITY_TIMEOUT_SECONDS,
};
pub use error::{ConfigResult, ConfigurationError};

/// Root configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FlowStartConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub dispatch: DispatchConfig,
    pub queues: QueueConfig,
    pub search: SearchConfig,
    pub worker: WorkerConfig,
}

impl Default for FlowStartConfig {
    fn default() -> Self {
        Self {
            database_url: "postgresql://localhost/flowstart_development".to_string(),
            max_connections: 10,
            dispatch: DispatchConfig::default(),
            queues: QueueConfig::default(),
            search: SearchConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Maximum contacts per batch task
    pub max_batch_size: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

/// Names of the two dispatch lanes and their delivery lease
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    pub direct: String,
    pub bulk: String,
    /// A popped task not acknowledged within this window is delivered again
    pub visibility_timeout_seconds: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            direct: DEFAULT_DIRECT_QUEUE.to_string(),
            bulk: DEFAULT_BULK_QUEUE.to_string(),
            visibility_timeout_seconds: DEFAULT_VISIBILITY_TIMEOUT_SECONDS,
        }
    }
}

impl QueueConfig {
    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Pages fetched before a scrolling query is declared runaway
    pub max_pages: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_SEARCH_PAGES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of concurrent polling tasks
    pub concurrency: usize,
    /// Sleep between polls when both queues are empty
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval_ms: 250,
        }
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl FlowStartConfig {
    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.dispatch.max_batch_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "dispatch.max_batch_size",
                "must be greater than zero",
            ));
        }
        if self.worker.concurrency == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker.concurrency",
                "must be greater than zero",
            ));
        }
        if self.search.max_pages == 0 {
            return Err(ConfigurationError::invalid_value(
                "search.max_pages",
                "must be greater than zero",
            ));
        }
        if self.queues.direct.is_empty() || self.queues.bulk.is_empty() {
            return Err(ConfigurationError::invalid_value(
                "queues",
                "queue names must not be empty",
            ));
        }
        if self.queues.direct == self.queues.bulk {
            return Err(ConfigurationError::invalid_value(
                "queues",
                format!("direct and bulk must differ (both '{}')", self.queues.direct),
            ));
        }
        if self.queues.visibility_timeout_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "queues.visibility_timeout_seconds",
                "must be greater than zero",
            ));
        }
        if self.max_connections == 0 {
            return Err(ConfigurationError::invalid_value(
                "max_connections",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Plain environment variables, as set by deployment tooling
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Ok(db_url) = std::env::var("DATABASE_URL") {
            config.database_url = db_url;
        }

        if let Ok(batch_size) = std::env::var("FLOWSTART_MAX_BATCH_SIZE") {
            config.dispatch.max_batch_size = parse_env("FLOWSTART_MAX_BATCH_SIZE", &batch_size)?;
        }

        if let Ok(concurrency) = std::env::var("FLOWSTART_WORKER_CONCURRENCY") {
            config.worker.concurrency = parse_env("FLOWSTART_WORKER_CONCURRENCY", &concurrency)?;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_env<T>(name: &str, value: &str) -> ConfigResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| ConfigurationError::InvalidEnvironmentVariable {
            name: name.to_string(),
            reason: e.to_string(),
        })
}
