//! # Concurrency Tests
//!
//! Many polling loops racing over one start's batches.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use flowstart_core::config::FlowStartConfig;
use flowstart_core::messaging::MemoryTaskQueue;
use flowstart_core::models::{ContactId, FlowId, FlowType, NewFlowStart, OrgId};
use flowstart_core::search::StaticSearch;
use flowstart_core::store::{MemoryStore, StartStore};
use flowstart_core::test_helpers::{create_contacts, MemoryHarness};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_workers_complete_start_exactly_once() {
    let mut config = FlowStartConfig::default();
    config.dispatch.max_batch_size = 10;
    config.worker.concurrency = 8;
    config.worker.poll_interval_ms = 2;

    let store = Arc::new(MemoryStore::new());
    let contacts: Vec<ContactId> = create_contacts(&store, OrgId(1), "Contact", 1_000)
        .into_iter()
        .map(|c| c.id)
        .collect();
    let harness = MemoryHarness::with_queue(
        store.clone(),
        StaticSearch::new(),
        Arc::new(MemoryTaskQueue::new()),
        config,
    );

    let (start, outcome) = harness
        .service
        .create_and_start(
            NewFlowStart::new(OrgId(1), FlowType::Background, FlowId(3), false, false)
                .with_contact_ids(contacts),
        )
        .await
        .unwrap();
    assert_eq!(outcome.batch_count, 100);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pool = harness.pool.clone();
    let running = tokio::spawn(async move { pool.run(shutdown_rx).await });

    let watcher = store.clone();
    tokio::time::timeout(Duration::from_secs(10), async move {
        while !watcher.find_flow_start(start.id).await.unwrap().unwrap().is_complete() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("start did not complete");

    shutdown_tx.send(true).unwrap();
    running.await.unwrap().unwrap();

    let complete = store.find_flow_start(start.id).await.unwrap().unwrap();
    assert_eq!(complete.contact_count, Some(1_000));
    assert_eq!(store.runs_for_start(start.id).await.unwrap().len(), 1_000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_starts_for_same_contacts() {
    let store = Arc::new(MemoryStore::new());
    let contacts: Vec<ContactId> = create_contacts(&store, OrgId(1), "Contact", 50)
        .into_iter()
        .map(|c| c.id)
        .collect();
    let harness = Arc::new(MemoryHarness::new(store.clone(), StaticSearch::new()));

    let mut handles = Vec::new();
    for flow in 1..=4 {
        let harness = harness.clone();
        let contacts = contacts.clone();
        handles.push(tokio::spawn(async move {
            harness
                .service
                .create_and_start(
                    NewFlowStart::new(OrgId(1), FlowType::Messaging, FlowId(flow), false, true)
                        .with_contact_ids(contacts),
                )
                .await
                .unwrap()
        }));
    }
    let mut starts = Vec::new();
    for handle in handles {
        starts.push(handle.await.unwrap().0);
    }

    harness.drain().await.unwrap();

    for start in starts {
        let complete = store.find_flow_start(start.id).await.unwrap().unwrap();
        assert!(complete.is_complete());
        assert_eq!(store.runs_for_start(start.id).await.unwrap().len(), 50);
    }
}
