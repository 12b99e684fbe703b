//! # PostgreSQL Backend Tests
//!
//! The full pipeline against PostgreSQL: leased table queue, row-locked
//! completion with dispatch generations and the `(contact_id, start_id)` run
//! constraint. Each test receives a fresh
//! migrated database from `sqlx::test`.

use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use flowstart_core::config::FlowStartConfig;
use flowstart_core::execution::{FlowRunner, PgFlowRunner, RunOutcome, RunRequest};
use flowstart_core::messaging::{PgTaskQueue, TaskQueue};
use flowstart_core::models::{ContactId, FlowId, FlowType, GroupId, NewFlowStart, OrgId};
use flowstart_core::orchestration::{BatchWorker, BatchWorkerPool, DispatchQueue, FlowStartService};
use flowstart_core::search::PgContactSearch;
use flowstart_core::store::{CompletionOutcome, PgStartStore, StartStore};

async fn insert_contacts(pool: &PgPool, org_id: OrgId, names: &[&str]) -> sqlx::Result<Vec<ContactId>> {
    let mut ids = Vec::with_capacity(names.len());
    for name in names {
        let id: i64 = sqlx::query_scalar("INSERT INTO contacts_contact (org_id, name) VALUES ($1, $2) RETURNING id")
            .bind(org_id.as_i64())
            .bind(*name)
            .fetch_one(pool)
            .await?;
        ids.push(ContactId(id));
    }
    Ok(ids)
}

async fn insert_group(pool: &PgPool, org_id: OrgId, members: &[ContactId]) -> sqlx::Result<GroupId> {
    let id: i64 = sqlx::query_scalar("INSERT INTO contacts_contactgroup (org_id, name) VALUES ($1, 'Doctors') RETURNING id")
        .bind(org_id.as_i64())
        .fetch_one(pool)
        .await?;
    for member in members {
        sqlx::query("INSERT INTO contacts_contactgroup_contacts (contactgroup_id, contact_id) VALUES ($1, $2)")
            .bind(id)
            .bind(member.as_i64())
            .execute(pool)
            .await?;
    }
    Ok(GroupId(id))
}

struct PgPipeline {
    store: Arc<PgStartStore>,
    queue: Arc<PgTaskQueue>,
    service: FlowStartService,
    pool: BatchWorkerPool,
}

fn pipeline(db: &PgPool) -> PgPipeline {
    let config = FlowStartConfig::default();
    let store = Arc::new(PgStartStore::new(db.clone()));
    let queue = Arc::new(PgTaskQueue::new(db.clone()));
    let service = FlowStartService::new(
        store.clone(),
        Arc::new(PgContactSearch::new(db.clone())),
        queue.clone(),
        &config,
    );
    let worker = Arc::new(BatchWorker::new(store.clone(), Arc::new(PgFlowRunner::new(db.clone()))));
    let pool = BatchWorkerPool::new(queue.clone(), worker, &config);
    PgPipeline {
        store,
        queue,
        service,
        pool,
    }
}

#[sqlx::test(migrator = "flowstart_core::database::MIGRATOR")]
#[ignore = "requires PostgreSQL"]
async fn test_group_plus_contact_start(db: PgPool) -> sqlx::Result<()> {
    let org = OrgId(1);
    let names: Vec<String> = (1..=121).map(|n| format!("Doctor {n}")).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let doctors = insert_contacts(&db, org, &name_refs).await?;
    let bob = insert_contacts(&db, org, &["Bob"]).await?[0];
    let group = insert_group(&db, org, &doctors).await?;

    let p = pipeline(&db);
    let (start, outcome) = p
        .service
        .create_and_start(
            NewFlowStart::new(org, FlowType::Messaging, FlowId(10), false, false)
                .with_group_ids(vec![group])
                .with_contact_ids(vec![bob]),
        )
        .await
        .unwrap();

    assert_eq!(outcome.queue, DispatchQueue::Bulk);
    assert_eq!(outcome.contact_count, 122);
    assert_eq!(p.queue.size("bulk").await.unwrap(), 2);
    assert_eq!(p.pool.drain("bulk").await.unwrap(), 2);

    let complete = p.store.find_flow_start(start.id).await.unwrap().unwrap();
    assert!(complete.is_complete());
    assert_eq!(complete.contact_count, Some(122));
    assert_eq!(p.store.runs_for_start(start.id).await.unwrap().len(), 122);
    Ok(())
}

#[sqlx::test(migrator = "flowstart_core::database::MIGRATOR")]
#[ignore = "requires PostgreSQL"]
async fn test_query_start_with_restart_supersedes(db: PgPool) -> sqlx::Result<()> {
    let org = OrgId(1);
    let ids = insert_contacts(&db, org, &["Bob", "Cathy"]).await?;
    sqlx::query("INSERT INTO flows_flowrun (uuid, contact_id, flow_id, is_active) VALUES (gen_random_uuid(), $1, 10, TRUE)")
        .bind(ids[0].as_i64())
        .execute(&db)
        .await?;

    let p = pipeline(&db);
    let (start, outcome) = p
        .service
        .create_and_start(NewFlowStart::new(org, FlowType::Messaging, FlowId(10), true, false).with_query("bob"))
        .await
        .unwrap();
    assert_eq!(outcome.queue, DispatchQueue::Direct);
    assert_eq!(p.pool.drain("direct").await.unwrap(), 1);

    let active = p.store.active_runs_for_contacts(&[ids[0]]).await.unwrap();
    assert_eq!(active.len(), 1);
    assert!(active[0].belongs_to_start(start.id));

    let complete = p.store.find_flow_start(start.id).await.unwrap().unwrap();
    assert_eq!(complete.contact_count, Some(1));
    Ok(())
}

#[sqlx::test(migrator = "flowstart_core::database::MIGRATOR")]
#[ignore = "requires PostgreSQL"]
async fn test_batch_done_is_idempotent_under_row_lock(db: PgPool) -> sqlx::Result<()> {
    let store = Arc::new(PgStartStore::new(db.clone()));
    let start = store
        .insert_flow_start(NewFlowStart::new(OrgId(1), FlowType::Messaging, FlowId(1), false, false))
        .await
        .unwrap();
    let generation = store.begin_dispatch(start.id, 8).await.unwrap().unwrap();

    let handles: Vec<_> = (0..16u32)
        .map(|n| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .record_batch_done(start.id, generation, n % 8, 800)
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut completed = 0;
    for handle in handles {
        if let CompletionOutcome::Completed { contact_count } = handle.await.unwrap() {
            assert_eq!(contact_count, 800);
            completed += 1;
        }
    }
    assert_eq!(completed, 1);
    Ok(())
}

#[sqlx::test(migrator = "flowstart_core::database::MIGRATOR")]
#[ignore = "requires PostgreSQL"]
async fn test_redispatch_clears_done_set(db: PgPool) -> sqlx::Result<()> {
    let store = PgStartStore::new(db.clone());
    let start = store
        .insert_flow_start(NewFlowStart::new(OrgId(1), FlowType::Messaging, FlowId(1), false, false))
        .await
        .unwrap();

    assert_eq!(store.begin_dispatch(start.id, 3).await.unwrap(), Some(1));
    store.record_batch_done(start.id, 1, 1, 250).await.unwrap();
    assert_eq!(store.begin_dispatch(start.id, 2).await.unwrap(), Some(2));

    assert_eq!(
        store.record_batch_done(start.id, 1, 0, 250).await.unwrap(),
        CompletionOutcome::Superseded {
            generation: 1,
            current: 2
        }
    );
    assert_eq!(
        store.record_batch_done(start.id, 2, 0, 150).await.unwrap(),
        CompletionOutcome::Pending {
            batches_done: 1,
            batch_count: 2
        }
    );
    assert_eq!(
        store.record_batch_done(start.id, 2, 1, 150).await.unwrap(),
        CompletionOutcome::Completed { contact_count: 150 }
    );
    Ok(())
}

#[sqlx::test(migrator = "flowstart_core::database::MIGRATOR")]
#[ignore = "requires PostgreSQL"]
async fn test_unacknowledged_task_is_redelivered(db: PgPool) -> sqlx::Result<()> {
    let queue = PgTaskQueue::new(db.clone()).with_visibility_timeout(Duration::from_millis(200));
    let id = queue.push("bulk", "t", serde_json::json!({"n": 1})).await.unwrap();

    let leased = queue.pop("bulk").await.unwrap().unwrap();
    assert_eq!(leased.id, id);
    assert_eq!(leased.read_count, 1);
    assert!(queue.pop("bulk").await.unwrap().is_none());
    assert_eq!(queue.size("bulk").await.unwrap(), 1);

    tokio::time::sleep(Duration::from_millis(400)).await;
    let redelivered = queue.pop("bulk").await.unwrap().unwrap();
    assert_eq!(redelivered.id, id);
    assert_eq!(redelivered.read_count, 2);

    queue.release("bulk", id).await.unwrap();
    let released = queue.pop("bulk").await.unwrap().unwrap();
    assert_eq!(released.read_count, 3);

    queue.delete("bulk", id).await.unwrap();
    assert_eq!(queue.size("bulk").await.unwrap(), 0);
    Ok(())
}

#[sqlx::test(migrator = "flowstart_core::database::MIGRATOR")]
#[ignore = "requires PostgreSQL"]
async fn test_runner_without_restart_keeps_active_run(db: PgPool) -> sqlx::Result<()> {
    let org = OrgId(1);
    let cathy = insert_contacts(&db, org, &["Cathy"]).await?[0];
    let runner = PgFlowRunner::new(db.clone());
    let store = PgStartStore::new(db.clone());
    let first = store
        .insert_flow_start(NewFlowStart::new(org, FlowType::Messaging, FlowId(10), false, false))
        .await
        .unwrap();
    let second = store
        .insert_flow_start(NewFlowStart::new(org, FlowType::Messaging, FlowId(10), false, false))
        .await
        .unwrap();

    let request = RunRequest {
        org_id: org,
        contact_id: cathy,
        flow_id: FlowId(10),
        flow_type: FlowType::Messaging,
        start_id: first.id,
        restart: false,
        extra: None,
    };

    let created = runner
        .create_or_restart_run(request.clone())
        .await
        .unwrap();
    assert!(created.is_created());

    let blocked = runner
        .create_or_restart_run(RunRequest {
            start_id: second.id,
            ..request
        })
        .await
        .unwrap();
    assert_eq!(blocked, RunOutcome::ActiveInFlow(created.run().clone()));

    let active = store.active_runs_for_contacts(&[cathy]).await.unwrap();
    assert_eq!(active.len(), 1);
    assert!(active[0].belongs_to_start(first.id));
    Ok(())
}
