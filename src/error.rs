//! # Error Types
//!
//! Crate-wide error taxonomy for the dispatch pipeline. Collaborator-specific
//! errors ([`QueueError`](crate::messaging::QueueError),
//! [`SearchError`](crate::search::SearchError),
//! [`RunnerError`](crate::execution::RunnerError)) are folded into these
//! variants at the component boundary with the start they relate to.

use thiserror::Error;

use crate::config::ConfigurationError;
use crate::models::FlowStartId;

#[derive(Error, Debug)]
pub enum FlowStartError {
    /// Audience could not be computed; the start was never dispatched
    #[error("Resolution error for start {start_id}: {message}")]
    Resolution {
        start_id: FlowStartId,
        message: String,
    },

    /// Batches could not all be enqueued; the start stays pending
    #[error("Dispatch error for start {start_id}: {message}")]
    Dispatch {
        start_id: FlowStartId,
        message: String,
    },

    /// A batch task could not be processed as a whole
    #[error("Worker error: {message}")]
    Worker { message: String },

    #[error("Flow start not found: {0}")]
    StartNotFound(FlowStartId),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl FlowStartError {
    pub fn resolution(start_id: FlowStartId, message: impl Into<String>) -> Self {
        Self::Resolution {
            start_id,
            message: message.into(),
        }
    }

    pub fn dispatch(start_id: FlowStartId, message: impl Into<String>) -> Self {
        Self::Dispatch {
            start_id,
            message: message.into(),
        }
    }

    pub fn worker(message: impl Into<String>) -> Self {
        Self::Worker {
            message: message.into(),
        }
    }

    /// Whether the failure happened before any batch was queued
    pub fn is_pre_dispatch(&self) -> bool {
        matches!(self, Self::Resolution { .. } | Self::Validation(_))
    }
}

impl From<sqlx::Error> for FlowStartError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::Database("No rows found".to_string()),
            sqlx::Error::Configuration(config_err) => Self::Configuration(config_err.to_string()),
            other => Self::Database(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for FlowStartError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::Database(format!("Migration failed: {err}"))
    }
}

impl From<ConfigurationError> for FlowStartError {
    fn from(err: ConfigurationError) -> Self {
        Self::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FlowStartError>;
