#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Flow Start Core
//!
//! Batch dispatch engine for starting a message flow across a large,
//! dynamically resolved audience of contacts.
//!
//! ## Overview
//!
//! A flow start names its audience three ways: explicit contacts, contact
//! groups and a search query. The engine resolves that audience, picks a
//! queue lane from the targeting shape, splits the audience into fixed-size
//! batches and queues one task per batch. Independent workers consume the
//! batches, decide per contact whether a run should be created and report
//! back, and the start flips to `complete` exactly once after its last batch,
//! whatever order batches finish in.
//!
//! ## Module Organization
//!
//! - [`models`] - Flow starts, batches, runs, contacts and typed ids
//! - [`orchestration`] - Resolution, classification, splitting, dispatch, workers, completion
//! - [`store`] - Start bookkeeping in memory or PostgreSQL
//! - [`messaging`] - Task queue contract and backends
//! - [`search`] - Contact search contract and backends
//! - [`execution`] - Flow runner contract and backends
//! - [`database`] - Connection pool and migrations
//! - [`config`] - Layered configuration
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use flowstart_core::config::FlowStartConfig;
//! use flowstart_core::execution::MemoryFlowRunner;
//! use flowstart_core::messaging::MemoryTaskQueue;
//! use flowstart_core::models::{FlowId, FlowType, NewFlowStart, OrgId};
//! use flowstart_core::orchestration::{BatchWorker, BatchWorkerPool, FlowStartService};
//! use flowstart_core::search::StaticSearch;
//! use flowstart_core::store::MemoryStore;
//!
//! # async fn example() -> flowstart_core::error::Result<()> {
//! let config = FlowStartConfig::default();
//! let store = Arc::new(MemoryStore::new());
//! let queue = Arc::new(MemoryTaskQueue::new());
//! let ann = store.create_contact(OrgId(1), "Ann");
//!
//! let service = FlowStartService::new(store.clone(), Arc::new(StaticSearch::new()), queue.clone(), &config);
//! let (_, outcome) = service
//!     .create_and_start(
//!         NewFlowStart::new(OrgId(1), FlowType::Messaging, FlowId(7), false, false)
//!             .with_contact_ids(vec![ann.id]),
//!     )
//!     .await?;
//!
//! let runner = Arc::new(MemoryFlowRunner::new(store.clone()));
//! let pool = BatchWorkerPool::new(queue, Arc::new(BatchWorker::new(store, runner)), &config);
//! pool.drain(&outcome.queue_name).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod execution;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod orchestration;
pub mod search;
pub mod store;
pub mod test_helpers;

pub use config::FlowStartConfig;
pub use error::{FlowStartError, Result};
pub use models::{FlowStart, FlowStartBatch, NewFlowStart};
pub use orchestration::{BatchWorker, BatchWorkerPool, DispatchOutcome, FlowStartService};
