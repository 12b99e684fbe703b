//! # Flow Start Worker
//!
//! Consumes `start_flow_batch` tasks from the PostgreSQL task queue until
//! Ctrl-C. Configuration comes from `FLOWSTART_CONFIG` (a file path) or
//! `config/flowstart.{toml,yaml}`, overridden by `FLOWSTART__*` variables.

use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

use flowstart_core::config::FlowStartConfig;
use flowstart_core::database::DatabaseConnection;
use flowstart_core::execution::PgFlowRunner;
use flowstart_core::logging::init_structured_logging;
use flowstart_core::messaging::PgTaskQueue;
use flowstart_core::orchestration::{BatchWorker, BatchWorkerPool};
use flowstart_core::store::PgStartStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_structured_logging();

    let config_path = std::env::var("FLOWSTART_CONFIG").ok().map(PathBuf::from);
    let config = FlowStartConfig::load(config_path.as_deref()).context("loading configuration")?;

    let db = DatabaseConnection::connect(&config)
        .await
        .context("connecting to database")?;
    db.migrate().await.context("running migrations")?;

    let pool = db.pool().clone();
    let store = Arc::new(PgStartStore::new(pool.clone()));
    let runner = Arc::new(PgFlowRunner::new(pool.clone()));
    let queue = Arc::new(PgTaskQueue::new(pool).with_visibility_timeout(config.queues.visibility_timeout()));
    let worker = Arc::new(BatchWorker::new(store, runner));
    let workers = BatchWorkerPool::new(queue, worker, &config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => error!(error = %e, "Failed to listen for Ctrl-C, shutting down"),
        }
        let _ = shutdown_tx.send(true);
    });

    workers.run(shutdown_rx).await?;
    db.close().await;
    Ok(())
}
