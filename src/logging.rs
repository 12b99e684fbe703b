//! # Structured Logging Module
//!
//! Environment-aware structured logging for the dispatcher and worker pool.
//! Console output is human readable by default and switches to JSON lines
//! when `FLOWSTART_LOG_FORMAT=json`.

use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::models::FlowStartId;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = std::env::var("FLOWSTART_LOG")
            .map(EnvFilter::new)
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));
        let json = std::env::var("FLOWSTART_LOG_FORMAT")
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let console = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .json()
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(true)
                .boxed()
        };

        // A subscriber may already be installed by an embedding application
        if tracing_subscriber::registry()
            .with(console.with_filter(filter))
            .try_init()
            .is_err()
        {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            json = json,
            "Structured logging initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("FLOWSTART_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for start-level operations
pub fn log_start_operation(
    operation: &str,
    start_id: FlowStartId,
    queue: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        start_id = start_id.as_i64(),
        queue = queue,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "START_OPERATION"
    );
}

/// Log structured data for batch-level operations
pub fn log_batch_operation(
    operation: &str,
    start_id: FlowStartId,
    batch_index: u32,
    contacts: usize,
    runs_created: Option<usize>,
    status: &str,
) {
    tracing::info!(
        operation = %operation,
        start_id = start_id.as_i64(),
        batch_index = batch_index,
        contacts = contacts,
        runs_created = runs_created,
        status = %status,
        timestamp = %Utc::now().to_rfc3339(),
        "BATCH_OPERATION"
    );
}
