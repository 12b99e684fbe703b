//! # Messaging Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue operation failed: {queue_name}: {operation}: {message}")]
    QueueOperation {
        queue_name: String,
        operation: String,
        message: String,
    },

    #[error("Queue unavailable: {queue_name}")]
    Unavailable { queue_name: String },

    #[error("Message serialization error: {message}")]
    MessageSerialization { message: String },

    #[error("Message deserialization error: {message}")]
    MessageDeserialization { message: String },

    #[error("Unexpected task type {actual} (expected {expected})")]
    UnexpectedTaskType { expected: String, actual: String },
}

impl QueueError {
    pub fn queue_operation(
        queue_name: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::QueueOperation {
            queue_name: queue_name.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn unavailable(queue_name: impl Into<String>) -> Self {
        Self::Unavailable {
            queue_name: queue_name.into(),
        }
    }
}

/// Conversion from serde_json::Error to QueueError
impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            Self::MessageDeserialization {
                message: err.to_string(),
            }
        } else {
            Self::MessageSerialization {
                message: err.to_string(),
            }
        }
    }
}

pub type QueueResult<T> = Result<T, QueueError>;
