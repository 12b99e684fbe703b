//! # Flow Start Scenario Tests
//!
//! One organization, one flow, a sequence of starts run against the same
//! store. Runs created by earlier starts stay active, so later starts see
//! those contacts as already participating in the flow.

use std::sync::Arc;

use flowstart_core::models::{ContactId, FlowStartStatus, FlowType, GroupId, NewFlowStart, OrgId};
use flowstart_core::orchestration::DispatchQueue;
use flowstart_core::store::{MemoryStore, StartStore};
use flowstart_core::test_helpers::{create_org_fixtures, search_by_name, MemoryHarness};

struct Scenario {
    name: &'static str,
    group_ids: Vec<GroupId>,
    contact_ids: Vec<ContactId>,
    query: &'static str,
    restart_participants: bool,
    include_active: bool,
    queue: DispatchQueue,
    contact_count: i64,
    batch_count: usize,
    runs_created: usize,
}

#[tokio::test]
async fn test_start_scenarios_in_sequence() {
    let store = Arc::new(MemoryStore::new());
    let org = create_org_fixtures(&store, OrgId(1));

    // George is busy in another flow for the whole sequence
    let other_flow = flowstart_core::models::FlowId(org.flow_id.as_i64() + 1);
    store.insert_run(org.george.id, other_flow, None, true);

    let search = search_by_name(&[org.cathy.clone(), org.bob.clone(), org.george.clone()], "bob");
    let harness = MemoryHarness::new(store.clone(), search);
    let doctors = vec![org.doctors.id];

    let scenarios = vec![
        Scenario {
            name: "no criteria",
            group_ids: vec![],
            contact_ids: vec![],
            query: "",
            restart_participants: false,
            include_active: false,
            queue: DispatchQueue::Bulk,
            contact_count: 0,
            batch_count: 0,
            runs_created: 0,
        },
        Scenario {
            name: "doctors group",
            group_ids: doctors.clone(),
            contact_ids: vec![],
            query: "",
            restart_participants: false,
            include_active: false,
            queue: DispatchQueue::Bulk,
            contact_count: 121,
            batch_count: 2,
            runs_created: 121,
        },
        Scenario {
            name: "doctors again plus cathy, no restart",
            group_ids: doctors.clone(),
            contact_ids: vec![org.cathy.id],
            query: "",
            restart_participants: false,
            include_active: false,
            queue: DispatchQueue::Bulk,
            contact_count: 121,
            batch_count: 2,
            runs_created: 0,
        },
        Scenario {
            name: "cathy with restart",
            group_ids: vec![],
            contact_ids: vec![org.cathy.id],
            query: "",
            restart_participants: true,
            include_active: true,
            queue: DispatchQueue::Direct,
            contact_count: 1,
            batch_count: 1,
            runs_created: 1,
        },
        Scenario {
            name: "doctors plus bob",
            group_ids: doctors.clone(),
            contact_ids: vec![org.bob.id],
            query: "",
            restart_participants: false,
            include_active: false,
            queue: DispatchQueue::Bulk,
            contact_count: 122,
            batch_count: 2,
            runs_created: 1,
        },
        Scenario {
            name: "bob, no restart",
            group_ids: vec![],
            contact_ids: vec![org.bob.id],
            query: "",
            restart_participants: false,
            include_active: false,
            queue: DispatchQueue::Direct,
            contact_count: 1,
            batch_count: 1,
            runs_created: 0,
        },
        Scenario {
            name: "bob, include active only",
            group_ids: vec![],
            contact_ids: vec![org.bob.id],
            query: "",
            restart_participants: false,
            include_active: true,
            queue: DispatchQueue::Direct,
            contact_count: 1,
            batch_count: 1,
            runs_created: 0,
        },
        Scenario {
            name: "bob with restart",
            group_ids: vec![],
            contact_ids: vec![org.bob.id],
            query: "",
            restart_participants: true,
            include_active: true,
            queue: DispatchQueue::Direct,
            contact_count: 1,
            batch_count: 1,
            runs_created: 1,
        },
        Scenario {
            name: "query bob with restart",
            group_ids: vec![],
            contact_ids: vec![],
            query: "bob",
            restart_participants: true,
            include_active: true,
            queue: DispatchQueue::Direct,
            contact_count: 1,
            batch_count: 1,
            runs_created: 1,
        },
        Scenario {
            name: "george, busy elsewhere",
            group_ids: vec![],
            contact_ids: vec![org.george.id],
            query: "",
            restart_participants: true,
            include_active: false,
            queue: DispatchQueue::Direct,
            contact_count: 1,
            batch_count: 1,
            runs_created: 0,
        },
        Scenario {
            name: "george, including active",
            group_ids: vec![],
            contact_ids: vec![org.george.id],
            query: "",
            restart_participants: false,
            include_active: true,
            queue: DispatchQueue::Direct,
            contact_count: 1,
            batch_count: 1,
            runs_created: 1,
        },
    ];

    for scenario in scenarios {
        let new_start = NewFlowStart::new(
            org.org_id,
            FlowType::Messaging,
            org.flow_id,
            scenario.restart_participants,
            scenario.include_active,
        )
        .with_group_ids(scenario.group_ids.clone())
        .with_contact_ids(scenario.contact_ids.clone())
        .with_query(scenario.query);

        let (start, outcome) = harness.service.create_and_start(new_start).await.unwrap();
        assert_eq!(outcome.queue, scenario.queue, "{}: queue", scenario.name);

        let queue_name = scenario.queue.queue_name(&harness.config.queues);
        let other_lane = match scenario.queue {
            DispatchQueue::Direct => &harness.config.queues.bulk,
            DispatchQueue::Bulk => &harness.config.queues.direct,
        };
        assert!(harness.queue.pending(other_lane).is_empty(), "{}: other lane", scenario.name);

        let processed = harness.pool.drain(queue_name).await.unwrap();
        assert_eq!(processed, scenario.batch_count, "{}: batches", scenario.name);

        let runs = store.runs_for_start(start.id).await.unwrap();
        assert_eq!(runs.len(), scenario.runs_created, "{}: runs created", scenario.name);

        let stored = store.find_flow_start(start.id).await.unwrap().unwrap();
        assert_eq!(stored.status, FlowStartStatus::Complete, "{}: status", scenario.name);
        assert_eq!(stored.contact_count, Some(scenario.contact_count), "{}: contact count", scenario.name);
        assert_eq!(stored.batch_count, Some(scenario.batch_count as i32), "{}: batch count", scenario.name);
    }
}

#[tokio::test]
async fn test_restart_supersedes_the_active_run() {
    let store = Arc::new(MemoryStore::new());
    let org = create_org_fixtures(&store, OrgId(1));
    let previous = store.insert_run(org.bob.id, org.flow_id, None, true);

    let harness = MemoryHarness::new(store.clone(), search_by_name(&[org.bob.clone()], "bob"));
    let (start, outcome) = harness
        .service
        .create_and_start(
            NewFlowStart::new(org.org_id, FlowType::Messaging, org.flow_id, true, false).with_query("bob"),
        )
        .await
        .unwrap();
    assert_eq!(outcome.queue, DispatchQueue::Direct);
    assert_eq!(harness.drain().await.unwrap(), 1);

    let runs = store.runs();
    let old = runs.iter().find(|run| run.id == previous.id).unwrap();
    assert!(!old.is_active);

    let new_runs = store.runs_for_start(start.id).await.unwrap();
    assert_eq!(new_runs.len(), 1);
    assert!(new_runs[0].is_active);
    assert_eq!(new_runs[0].contact_id, org.bob.id);
}

#[tokio::test]
async fn test_contact_count_ignores_eligibility() {
    let store = Arc::new(MemoryStore::new());
    let org = create_org_fixtures(&store, OrgId(1));
    let harness = MemoryHarness::new(store.clone(), search_by_name(&[], "nobody"));

    let members = store.group_contact_ids(org.org_id, &[org.doctors.id]).await.unwrap();
    for contact_id in &members {
        store.insert_run(*contact_id, org.flow_id, None, true);
    }

    let (start, _) = harness
        .service
        .create_and_start(
            NewFlowStart::new(org.org_id, FlowType::Messaging, org.flow_id, false, false)
                .with_group_ids(vec![org.doctors.id])
                .with_contact_ids(members[..10].to_vec()),
        )
        .await
        .unwrap();
    harness.drain().await.unwrap();

    let stored = store.find_flow_start(start.id).await.unwrap().unwrap();
    assert_eq!(stored.contact_count, Some(121));
    assert!(store.runs_for_start(start.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_extra_is_handed_to_every_run_request() {
    let store = Arc::new(MemoryStore::new());
    let org = create_org_fixtures(&store, OrgId(1));
    let harness = MemoryHarness::new(store.clone(), search_by_name(&[], "nobody"));
    let extra = serde_json::json!({"campaign": "checkup"});

    harness
        .service
        .create_and_start(
            NewFlowStart::new(org.org_id, FlowType::Voice, org.flow_id, false, false)
                .with_contact_ids(vec![org.bob.id, org.cathy.id])
                .with_extra(extra.clone()),
        )
        .await
        .unwrap();
    harness.drain().await.unwrap();

    let requests = harness.runner.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|r| r.extra.as_ref() == Some(&extra) && r.flow_type == FlowType::Voice));
}
