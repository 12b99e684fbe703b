//! # PostgreSQL Start Store
//!
//! `flows_flowstart`, `contacts_contactgroup_contacts`, `flows_flowrun` and the
//! `flows_flowstart_batch` done-set. Completion locks the start row with
//! `SELECT ... FOR UPDATE` before counting finished batches, so two workers
//! finishing the last batches concurrently cannot both miss (or both perform)
//! the transition. Re-dispatching takes the same lock to bump the generation
//! and clear the done-set.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

use super::{CompletionOutcome, StartStore};
use crate::error::{FlowStartError, Result};
use crate::models::{
    ContactId, FlowId, FlowRun, FlowStart, FlowStartId, FlowStartStatus, GroupId, NewFlowStart,
    OrgId,
};

const FLOW_START_COLUMNS: &str = r#"
    id, uuid, org_id, flow_id, flow_type, contact_ids, group_ids, query,
    restart_participants, include_active, extra, status, contact_count, batch_count,
    dispatch_generation, created_at, modified_at
"#;

const FLOW_RUN_COLUMNS: &str =
    "id, uuid, contact_id, flow_id, start_id, is_active, created_at, modified_at";

#[derive(Debug, FromRow)]
struct FlowStartRow {
    id: i64,
    uuid: Uuid,
    org_id: i64,
    flow_id: i64,
    flow_type: String,
    contact_ids: Vec<i64>,
    group_ids: Vec<i64>,
    query: Option<String>,
    restart_participants: bool,
    include_active: bool,
    extra: Option<serde_json::Value>,
    status: String,
    contact_count: Option<i64>,
    batch_count: Option<i32>,
    dispatch_generation: i32,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
}

impl TryFrom<FlowStartRow> for FlowStart {
    type Error = FlowStartError;

    fn try_from(row: FlowStartRow) -> Result<Self> {
        Ok(FlowStart {
            id: FlowStartId(row.id),
            uuid: row.uuid,
            org_id: OrgId(row.org_id),
            flow_id: FlowId(row.flow_id),
            flow_type: row.flow_type.parse().map_err(FlowStartError::Database)?,
            contact_ids: row.contact_ids.into_iter().map(ContactId).collect(),
            group_ids: row.group_ids.into_iter().map(GroupId).collect(),
            query: row.query,
            restart_participants: row.restart_participants,
            include_active: row.include_active,
            extra: row.extra,
            status: row.status.parse().map_err(FlowStartError::Database)?,
            contact_count: row.contact_count,
            batch_count: row.batch_count,
            dispatch_generation: row.dispatch_generation,
            created_at: row.created_at,
            modified_at: row.modified_at,
        })
    }
}

fn raw_ids(contact_ids: &[ContactId]) -> Vec<i64> {
    contact_ids.iter().map(|id| id.as_i64()).collect()
}

#[derive(Debug, Clone)]
pub struct PgStartStore {
    pool: PgPool,
}

impl PgStartStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl StartStore for PgStartStore {
    async fn insert_flow_start(&self, new_start: NewFlowStart) -> Result<FlowStart> {
        let query = format!(
            r#"
            INSERT INTO flows_flowstart (
                uuid, org_id, flow_id, flow_type, contact_ids, group_ids, query,
                restart_participants, include_active, extra, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'pending')
            RETURNING {FLOW_START_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, FlowStartRow>(&query)
            .bind(Uuid::new_v4())
            .bind(new_start.org_id)
            .bind(new_start.flow_id)
            .bind(new_start.flow_type.as_str())
            .bind(raw_ids(&new_start.contact_ids))
            .bind(
                new_start
                    .group_ids
                    .iter()
                    .map(|id| id.as_i64())
                    .collect::<Vec<_>>(),
            )
            .bind(&new_start.query)
            .bind(new_start.restart_participants)
            .bind(new_start.include_active)
            .bind(&new_start.extra)
            .fetch_one(&self.pool)
            .await?;

        let start = FlowStart::try_from(row)?;
        debug!(start_id = start.id.as_i64(), flow_id = start.flow_id.as_i64(), "Flow start inserted");
        Ok(start)
    }

    async fn find_flow_start(&self, start_id: FlowStartId) -> Result<Option<FlowStart>> {
        let query = format!("SELECT {FLOW_START_COLUMNS} FROM flows_flowstart WHERE id = $1");
        sqlx::query_as::<_, FlowStartRow>(&query)
            .bind(start_id)
            .fetch_optional(&self.pool)
            .await?
            .map(FlowStart::try_from)
            .transpose()
    }

    async fn group_contact_ids(&self, org_id: OrgId, group_ids: &[GroupId]) -> Result<Vec<ContactId>> {
        if group_ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = group_ids.iter().map(|id| id.as_i64()).collect();
        let contact_ids = sqlx::query_scalar::<_, ContactId>(
            r#"
            SELECT m.contact_id
            FROM unnest($2::BIGINT[]) WITH ORDINALITY AS g(group_id, position)
            JOIN contacts_contactgroup cg ON cg.id = g.group_id AND cg.org_id = $1
            JOIN contacts_contactgroup_contacts m ON m.contactgroup_id = g.group_id
            JOIN contacts_contact c ON c.id = m.contact_id AND c.is_active
            ORDER BY g.position, m.contact_id
            "#,
        )
        .bind(org_id)
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(contact_ids)
    }

    async fn active_runs_for_contacts(&self, contact_ids: &[ContactId]) -> Result<Vec<FlowRun>> {
        if contact_ids.is_empty() {
            return Ok(Vec::new());
        }

        let query = format!(
            "SELECT {FLOW_RUN_COLUMNS} FROM flows_flowrun WHERE is_active AND contact_id = ANY($1)"
        );
        Ok(sqlx::query_as::<_, FlowRun>(&query)
            .bind(raw_ids(contact_ids))
            .fetch_all(&self.pool)
            .await?)
    }

    async fn contacts_with_start_runs(
        &self,
        start_id: FlowStartId,
        contact_ids: &[ContactId],
    ) -> Result<Vec<ContactId>> {
        if contact_ids.is_empty() {
            return Ok(Vec::new());
        }

        Ok(sqlx::query_scalar::<_, ContactId>(
            "SELECT contact_id FROM flows_flowrun WHERE start_id = $1 AND contact_id = ANY($2)",
        )
        .bind(start_id)
        .bind(raw_ids(contact_ids))
        .fetch_all(&self.pool)
        .await?)
    }

    async fn runs_for_start(&self, start_id: FlowStartId) -> Result<Vec<FlowRun>> {
        let query =
            format!("SELECT {FLOW_RUN_COLUMNS} FROM flows_flowrun WHERE start_id = $1 ORDER BY id");
        Ok(sqlx::query_as::<_, FlowRun>(&query)
            .bind(start_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn begin_dispatch(&self, start_id: FlowStartId, batch_count: u32) -> Result<Option<u32>> {
        let mut tx = self.pool.begin().await?;

        let locked: Option<(String,)> =
            sqlx::query_as("SELECT status FROM flows_flowstart WHERE id = $1 FOR UPDATE")
                .bind(start_id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some((status,)) = locked else {
            return Err(FlowStartError::StartNotFound(start_id));
        };
        let status: FlowStartStatus = status.parse().map_err(FlowStartError::Database)?;
        if status.is_terminal() {
            tx.commit().await?;
            return Ok(None);
        }

        sqlx::query("DELETE FROM flows_flowstart_batch WHERE start_id = $1")
            .bind(start_id)
            .execute(&mut *tx)
            .await?;

        let (generation,): (i32,) = sqlx::query_as(
            r#"
            UPDATE flows_flowstart
            SET batch_count = $2, dispatch_generation = dispatch_generation + 1, modified_at = now()
            WHERE id = $1
            RETURNING dispatch_generation
            "#,
        )
        .bind(start_id)
        .bind(batch_count as i32)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        debug!(
            start_id = start_id.as_i64(),
            batch_count = batch_count,
            generation = generation,
            "Dispatch generation opened"
        );
        Ok(Some(generation.max(0) as u32))
    }

    async fn record_batch_done(
        &self,
        start_id: FlowStartId,
        generation: u32,
        batch_index: u32,
        contact_count: i64,
    ) -> Result<CompletionOutcome> {
        let mut tx = self.pool.begin().await?;

        let locked: Option<(String, Option<i32>, i32)> = sqlx::query_as(
            "SELECT status, batch_count, dispatch_generation FROM flows_flowstart WHERE id = $1 FOR UPDATE",
        )
        .bind(start_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((status, batch_count, current)) = locked else {
            return Err(FlowStartError::StartNotFound(start_id));
        };
        let status: FlowStartStatus = status.parse().map_err(FlowStartError::Database)?;
        if status.is_terminal() {
            tx.commit().await?;
            return Ok(CompletionOutcome::AlreadyComplete);
        }

        let current = current.max(0) as u32;
        if generation != current {
            tx.commit().await?;
            return Ok(CompletionOutcome::Superseded { generation, current });
        }

        sqlx::query(
            r#"
            INSERT INTO flows_flowstart_batch (start_id, batch_index)
            VALUES ($1, $2)
            ON CONFLICT (start_id, batch_index) DO NOTHING
            "#,
        )
        .bind(start_id)
        .bind(batch_index as i32)
        .execute(&mut *tx)
        .await?;

        let (batches_done,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM flows_flowstart_batch WHERE start_id = $1")
                .bind(start_id)
                .fetch_one(&mut *tx)
                .await?;

        let batches_done = batches_done.max(0) as u32;
        let batch_count = batch_count.unwrap_or(i32::MAX).max(0) as u32;

        if batches_done < batch_count {
            tx.commit().await?;
            return Ok(CompletionOutcome::Pending {
                batches_done,
                batch_count,
            });
        }

        sqlx::query(
            r#"
            UPDATE flows_flowstart
            SET status = 'complete', contact_count = $2, modified_at = now()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(start_id)
        .bind(contact_count)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        debug!(
            start_id = start_id.as_i64(),
            contact_count = contact_count,
            batch_count = batch_count,
            "Completion transition committed"
        );
        Ok(CompletionOutcome::Completed { contact_count })
    }

    async fn complete_empty(&self, start_id: FlowStartId) -> Result<CompletionOutcome> {
        let result = sqlx::query(
            r#"
            UPDATE flows_flowstart
            SET status = 'complete', contact_count = 0, batch_count = 0, modified_at = now()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(start_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(CompletionOutcome::Completed { contact_count: 0 });
        }

        match self.find_flow_start(start_id).await? {
            Some(_) => Ok(CompletionOutcome::AlreadyComplete),
            None => Err(FlowStartError::StartNotFound(start_id)),
        }
    }
}
