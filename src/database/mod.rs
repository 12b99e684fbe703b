//! # Database
//!
//! PostgreSQL connection pooling and the schema the PostgreSQL backends
//! ([`PgStartStore`](crate::store::PgStartStore),
//! [`PgTaskQueue`](crate::messaging::PgTaskQueue),
//! [`PgContactSearch`](crate::search::PgContactSearch),
//! [`PgFlowRunner`](crate::execution::PgFlowRunner)) run against.
//!
//! ```rust,no_run
//! use flowstart_core::config::FlowStartConfig;
//! use flowstart_core::database::DatabaseConnection;
//!
//! # async fn example() -> flowstart_core::error::Result<()> {
//! let config = FlowStartConfig::from_env()?;
//! let db = DatabaseConnection::connect(&config).await?;
//! db.migrate().await?;
//! assert!(db.health_check().await?);
//! # Ok(())
//! # }
//! ```

pub mod connection;

pub use connection::DatabaseConnection;

/// Embedded schema migrations
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
