//! # Messaging Module
//!
//! Task queue contract and its in-memory and PostgreSQL implementations.
//! Batch tasks flow from the dispatcher to the worker pool through here.

pub mod errors;
pub mod memory_queue;
pub mod message;
pub mod pg_task_queue;
pub mod task_queue;

pub use errors::{QueueError, QueueResult};
pub use memory_queue::MemoryTaskQueue;
pub use message::{encode_batch, QueuedTask};
pub use pg_task_queue::PgTaskQueue;
pub use task_queue::TaskQueue;
