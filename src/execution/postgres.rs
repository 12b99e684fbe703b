//! # PostgreSQL Flow Runner
//!
//! Records runs in `flows_flowrun` for deployments where the flow engine picks
//! new runs up from the table. Supersede and insert happen in one
//! transaction holding a per-contact advisory lock; the `(contact_id,
//! start_id)` unique key makes a repeated request return the existing run.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use super::{FlowRunner, RunOutcome, RunRequest, RunnerError};
use crate::models::FlowRun;

const RUN_COLUMNS: &str = "id, uuid, contact_id, flow_id, start_id, is_active, created_at, modified_at";

#[derive(Debug, Clone)]
pub struct PgFlowRunner {
    pool: PgPool,
}

impl PgFlowRunner {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn try_create(&self, request: &RunRequest) -> Result<RunOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(request.contact_id)
            .execute(&mut *tx)
            .await?;

        let existing_query = format!(
            "SELECT {RUN_COLUMNS} FROM flows_flowrun WHERE contact_id = $1 AND start_id = $2"
        );
        if let Some(existing) = sqlx::query_as::<_, FlowRun>(&existing_query)
            .bind(request.contact_id)
            .bind(request.start_id)
            .fetch_optional(&mut *tx)
            .await?
        {
            tx.commit().await?;
            return Ok(RunOutcome::AlreadyStarted(existing));
        }

        if !request.restart {
            let active_query = format!(
                "SELECT {RUN_COLUMNS} FROM flows_flowrun WHERE contact_id = $1 AND flow_id = $2 AND is_active LIMIT 1"
            );
            if let Some(active) = sqlx::query_as::<_, FlowRun>(&active_query)
                .bind(request.contact_id)
                .bind(request.flow_id)
                .fetch_optional(&mut *tx)
                .await?
            {
                tx.commit().await?;
                return Ok(RunOutcome::ActiveInFlow(active));
            }
        }

        let superseded = sqlx::query(
            r#"
            UPDATE flows_flowrun
            SET is_active = FALSE, modified_at = now()
            WHERE contact_id = $1 AND flow_id = $2 AND is_active
            "#,
        )
        .bind(request.contact_id)
        .bind(request.flow_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let insert_query = format!(
            r#"
            INSERT INTO flows_flowrun (uuid, contact_id, flow_id, start_id, is_active)
            VALUES ($1, $2, $3, $4, TRUE)
            ON CONFLICT (contact_id, start_id) DO NOTHING
            RETURNING {RUN_COLUMNS}
            "#
        );
        let inserted = sqlx::query_as::<_, FlowRun>(&insert_query)
            .bind(Uuid::new_v4())
            .bind(request.contact_id)
            .bind(request.flow_id)
            .bind(request.start_id)
            .fetch_optional(&mut *tx)
            .await?;

        let outcome = match inserted {
            Some(run) => RunOutcome::Created(run),
            None => {
                // a concurrent worker won the insert
                tx.rollback().await?;
                let run = sqlx::query_as::<_, FlowRun>(&existing_query)
                    .bind(request.contact_id)
                    .bind(request.start_id)
                    .fetch_one(&self.pool)
                    .await?;
                return Ok(RunOutcome::AlreadyStarted(run));
            }
        };
        tx.commit().await?;

        debug!(
            contact_id = request.contact_id.as_i64(),
            start_id = request.start_id.as_i64(),
            superseded = superseded,
            "Flow run created"
        );
        Ok(outcome)
    }
}

#[async_trait]
impl FlowRunner for PgFlowRunner {
    async fn create_or_restart_run(&self, request: RunRequest) -> Result<RunOutcome, RunnerError> {
        self.try_create(&request)
            .await
            .map_err(|e| RunnerError::CreateFailed {
                contact_id: request.contact_id,
                message: e.to_string(),
            })
    }
}
