//! # Failure Recovery Tests
//!
//! Resolution and dispatch failures leave the start pending; redelivered and
//! re-dispatched batches never create a second run or a second completion,
//! and batches of an earlier dispatch never count toward a resumed one.

use std::sync::Arc;

use flowstart_core::config::FlowStartConfig;
use flowstart_core::error::FlowStartError;
use flowstart_core::messaging::{MemoryTaskQueue, TaskQueue};
use flowstart_core::models::{ContactId, FlowId, FlowStartStatus, FlowType, NewFlowStart, OrgId};
use flowstart_core::orchestration::TaskDisposition;
use flowstart_core::store::CompletionOutcome;
use flowstart_core::search::{SearchError, StaticSearch};
use flowstart_core::store::{MemoryStore, StartStore};
use flowstart_core::test_helpers::{create_contacts, create_org_fixtures, search_by_name, MemoryHarness};

#[tokio::test]
async fn test_search_failure_leaves_start_pending_and_unqueued() {
    let store = Arc::new(MemoryStore::new());
    let org = create_org_fixtures(&store, OrgId(1));
    let harness = MemoryHarness::new(
        store.clone(),
        StaticSearch::failing(SearchError::Timeout { timeout_ms: 1_000 }),
    );

    let err = harness
        .service
        .create_and_start(
            NewFlowStart::new(org.org_id, FlowType::Messaging, org.flow_id, false, false)
                .with_contact_ids(vec![org.bob.id])
                .with_query("bob"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FlowStartError::Resolution { .. }));
    assert!(err.is_pre_dispatch());

    assert!(harness.queue.pending(&harness.config.queues.direct).is_empty());
    assert!(harness.queue.pending(&harness.config.queues.bulk).is_empty());
    assert!(harness.runner.requests().is_empty());

    let bob_runs = store
        .active_runs_for_contacts(&[org.bob.id])
        .await
        .unwrap();
    assert!(bob_runs.is_empty());
}

#[tokio::test]
async fn test_dispatch_failure_then_resume_completes_once() {
    let store = Arc::new(MemoryStore::new());
    let contacts: Vec<ContactId> = create_contacts(&store, OrgId(1), "Patient", 250)
        .into_iter()
        .map(|c| c.id)
        .collect();

    let queue = Arc::new(MemoryTaskQueue::with_push_limit(1));
    let harness = MemoryHarness::with_queue(
        store.clone(),
        StaticSearch::new(),
        queue.clone(),
        FlowStartConfig::default(),
    );

    let start = store
        .insert_flow_start(
            NewFlowStart::new(OrgId(1), FlowType::Messaging, FlowId(9), false, false)
                .with_contact_ids(contacts.clone()),
        )
        .await
        .unwrap();

    let err = harness.service.start(&start).await.unwrap_err();
    assert!(matches!(err, FlowStartError::Dispatch { .. }));

    let pending = store.find_flow_start(start.id).await.unwrap().unwrap();
    assert_eq!(pending.status, FlowStartStatus::Pending);
    assert_eq!(pending.batch_count, Some(3));

    // the one queued batch is processed before recovery
    assert_eq!(harness.pool.drain("direct").await.unwrap(), 1);
    assert!(!store.find_flow_start(start.id).await.unwrap().unwrap().is_complete());

    queue.grant_pushes(3);
    let outcome = harness.service.resume(start.id).await.unwrap();
    assert_eq!(outcome.batch_count, 3);
    assert_eq!(harness.pool.drain("direct").await.unwrap(), 3);

    let complete = store.find_flow_start(start.id).await.unwrap().unwrap();
    assert_eq!(complete.status, FlowStartStatus::Complete);
    assert_eq!(complete.contact_count, Some(250));
    assert_eq!(store.runs_for_start(start.id).await.unwrap().len(), 250);
}

#[tokio::test]
async fn test_resume_after_audience_shrank_waits_for_new_batches() {
    let store = Arc::new(MemoryStore::new());
    let patients: Vec<ContactId> = create_contacts(&store, OrgId(1), "Patient", 250)
        .into_iter()
        .map(|c| c.id)
        .collect();

    let queue = Arc::new(MemoryTaskQueue::with_push_limit(2));
    let harness = MemoryHarness::with_queue(
        store.clone(),
        StaticSearch::new().with_results("patient", patients.clone()),
        queue.clone(),
        FlowStartConfig::default(),
    );
    let direct = harness.config.queues.direct.clone();

    let start = store
        .insert_flow_start(
            NewFlowStart::new(OrgId(1), FlowType::Messaging, FlowId(9), false, false)
                .with_query("patient"),
        )
        .await
        .unwrap();

    let err = harness.service.start(&start).await.unwrap_err();
    assert!(matches!(err, FlowStartError::Dispatch { .. }));

    // the second of the two queued batches runs before recovery
    let first_dispatch = queue.pending(&direct);
    assert_eq!(first_dispatch.len(), 2);
    let report = match harness.pool.handle_task(first_dispatch[1].clone()).await {
        TaskDisposition::Processed(report) => report,
        other => panic!("unexpected disposition {other:?}"),
    };
    assert_eq!(report.runs_created, 100);

    // the index changed before the start was resumed
    harness.search.set_results("patient", patients[..150].to_vec());
    queue.grant_pushes(2);
    let outcome = harness.service.resume(start.id).await.unwrap();
    assert_eq!(outcome.contact_count, 150);
    assert_eq!(outcome.batch_count, 2);
    assert_eq!(queue.size(&direct).await.unwrap(), 3);

    let mut transitions = 0;
    while let Some(disposition) = harness.pool.poll_once().await.unwrap() {
        let report = match disposition {
            TaskDisposition::Processed(report) => report,
            other => panic!("unexpected disposition {other:?}"),
        };
        if report.completion.transitioned() {
            transitions += 1;
        }

        let remaining = queue.size(&direct).await.unwrap();
        let current = store.find_flow_start(start.id).await.unwrap().unwrap();
        assert_eq!(current.is_complete(), remaining == 0, "completion with {remaining} batches queued");
        if let CompletionOutcome::Superseded { generation, current } = report.completion {
            assert_eq!((generation, current), (1, 2));
        }
    }
    assert_eq!(transitions, 1);

    let complete = store.find_flow_start(start.id).await.unwrap().unwrap();
    assert_eq!(complete.contact_count, Some(150));
    // runs made by the first dispatch before the resume are kept
    assert_eq!(store.runs_for_start(start.id).await.unwrap().len(), 200);
}

#[tokio::test]
async fn test_redelivered_tasks_create_no_extra_runs() {
    let store = Arc::new(MemoryStore::new());
    let org = create_org_fixtures(&store, OrgId(1));
    let harness = MemoryHarness::new(store.clone(), search_by_name(&[], "nobody"));

    let (start, outcome) = harness
        .service
        .create_and_start(
            NewFlowStart::new(org.org_id, FlowType::Messaging, org.flow_id, false, false)
                .with_group_ids(vec![org.doctors.id]),
        )
        .await
        .unwrap();

    // every task delivered twice, the copies arriving first in reverse order
    let tasks = harness.queue.pending(&outcome.queue_name);
    for task in tasks.iter().rev() {
        harness
            .queue
            .push(&task.queue, &task.task_type, task.payload.clone())
            .await
            .unwrap();
    }

    assert_eq!(harness.pool.drain(&outcome.queue_name).await.unwrap(), 4);

    let complete = store.find_flow_start(start.id).await.unwrap().unwrap();
    assert!(complete.is_complete());
    assert_eq!(complete.contact_count, Some(121));
    assert_eq!(store.runs_for_start(start.id).await.unwrap().len(), 121);
}

#[tokio::test]
async fn test_runner_failures_do_not_block_completion() {
    let store = Arc::new(MemoryStore::new());
    let org = create_org_fixtures(&store, OrgId(1));
    let harness = MemoryHarness::new(store.clone(), search_by_name(&[], "nobody"));
    harness.runner.fail_for(org.cathy.id);

    let (start, _) = harness
        .service
        .create_and_start(
            NewFlowStart::new(org.org_id, FlowType::Messaging, org.flow_id, false, false)
                .with_group_ids(vec![org.doctors.id]),
        )
        .await
        .unwrap();
    harness.drain().await.unwrap();

    let complete = store.find_flow_start(start.id).await.unwrap().unwrap();
    assert!(complete.is_complete());
    assert_eq!(complete.contact_count, Some(121));
    assert_eq!(store.runs_for_start(start.id).await.unwrap().len(), 120);
}
