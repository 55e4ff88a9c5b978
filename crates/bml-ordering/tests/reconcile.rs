mod common;

use bml_core::{SlotMap, WorkflowStage};
use bml_ordering::{EngineConfig, OrderingEngine, OrderingError, Phase};
use common::{engine, id, FlakyStore, COLLECTION};
use std::time::Duration;

fn board() -> FlakyStore {
    let store = FlakyStore::new();
    store.seed(1, &["priority-5", "status-build", "bug"]);
    store.seed(2, &["priority-2", "priority-high"]);
    store.seed(3, &["status-learn"]);
    store.seed(4, &[]);
    store.seed(9, &["priority-1", "status-plan"]);
    store
}

fn slot_map() -> SlotMap {
    SlotMap::from_json(
        r#"{
            "learn": [{"issueId": 3, "parentSlot": null}],
            "plan": [
                {"issueId": 1, "parentSlot": null},
                {"issueId": 2, "parentSlot": 0},
                {"issueId": "4", "parentSlot": 1}
            ]
        }"#,
    )
    .expect("slot map")
}

#[tokio::test]
async fn reconcile_rewrites_every_item_from_the_slot_map() {
    let engine = engine(board());
    let report = engine
        .reconcile(COLLECTION, &slot_map())
        .await
        .expect("reconcile");

    assert!(report.success);
    assert_eq!(report.planned, 4);
    assert_eq!(report.items_seen, 5);
    assert_eq!(report.updated, 4);
    assert_eq!(report.failed_phase, None);

    let store = engine.store();
    assert_eq!(store.tags(3).await, vec!["priority-1", "status-learn"]);
    assert_eq!(store.tags(1).await, vec!["bug", "priority-2", "status-plan"]);
    assert_eq!(store.tags(2).await, vec!["priority-2.1", "status-plan"]);
    assert_eq!(store.tags(4).await, vec!["priority-2.1.1", "status-plan"]);
    // Items outside the slot map lose their ordering tags.
    assert!(store.tags(9).await.is_empty());
}

#[tokio::test]
async fn reconcile_twice_yields_the_same_tags() {
    let engine = engine(board());
    let map = slot_map();
    engine.reconcile(COLLECTION, &map).await.expect("first");
    let first = engine.store().inner().snapshot().expect("snapshot");

    let report = engine.reconcile(COLLECTION, &map).await.expect("second");
    assert!(report.success);
    let second = engine.store().inner().snapshot().expect("snapshot");

    let collection = |doc: &bml_storage::StoreDocument| {
        doc.collection(COLLECTION)
            .expect("collection")
            .items
            .iter()
            .map(|(item, tags)| {
                let mut tags = tags.clone();
                tags.sort();
                (item.clone(), tags)
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(collection(&first), collection(&second));
}

#[tokio::test]
async fn priority_phase_failure_stops_before_stages() {
    let store = board();
    store.fail_adds_with_prefix("priority-2");
    let engine = engine(store);

    let report = engine
        .reconcile(COLLECTION, &slot_map())
        .await
        .expect("report");
    assert!(!report.success);
    assert_eq!(report.failed_phase, Some(Phase::WritePriorities));
    assert_eq!(report.clear_tags.attempted, 5);
    assert_eq!(report.clear_tags.succeeded, 5);
    assert_eq!(report.write_priorities.attempted, 4);
    assert_eq!(report.write_priorities.succeeded, 1);
    assert_eq!(report.write_stages, None);
    assert_eq!(report.updated, 0);

    // Phase A stays applied; only item 3 got its new key; no stage was written.
    assert_eq!(engine.store().tags(3).await, vec!["priority-1"]);
    assert_eq!(engine.store().tags(1).await, vec!["bug"]);

    match report.into_result() {
        Err(OrderingError::PhaseFailure {
            phase,
            attempted,
            succeeded,
        }) => {
            assert_eq!(phase, Phase::WritePriorities);
            assert_eq!((attempted, succeeded), (4, 1));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn stage_phase_failure_is_reported_with_its_counts() {
    let store = board();
    store.fail_adds_with_prefix("status-plan");
    let engine = engine(store);

    let report = engine
        .reconcile(COLLECTION, &slot_map())
        .await
        .expect("report");
    assert_eq!(report.failed_phase, Some(Phase::WriteStages));
    let stages = report.write_stages.clone().expect("stage phase ran");
    assert_eq!((stages.attempted, stages.succeeded), (4, 1));
    assert_eq!(report.updated, 1);
    assert_eq!(report.write_priorities.failed(), 0);
}

#[tokio::test]
async fn clear_failures_are_counted_but_not_fatal() {
    let store = board();
    store.fail_gets_for(9);
    let engine = engine(store);

    let report = engine
        .reconcile(COLLECTION, &slot_map())
        .await
        .expect("reconcile");
    assert!(report.success);
    assert_eq!(report.clear_tags.failed(), 1);
    assert_eq!(
        engine.store().tags(9).await,
        vec!["priority-1", "status-plan"]
    );
}

#[tokio::test]
async fn failed_removal_does_not_stop_clearing_the_item() {
    let store = FlakyStore::new();
    store.seed(5, &["priority-9", "priority-7", "status-build", "status-plan"]);
    store.fail_removal_of(5, "priority-9");
    let engine = engine(store);
    let map = SlotMap::from_json(r#"{"learn": [{"issueId": 5, "parentSlot": null}]}"#)
        .expect("slot map");

    let report = engine.reconcile(COLLECTION, &map).await.expect("reconcile");
    assert!(report.success);
    assert_eq!(report.clear_tags.attempted, 1);
    assert_eq!(report.clear_tags.failed(), 1);
    // Only the injected failure survives phase A.
    assert_eq!(
        engine.store().tags(5).await,
        vec!["priority-1", "priority-9", "status-learn"]
    );
    let item = engine.item(COLLECTION, &id(5)).await.expect("item");
    assert_eq!(item.stage, WorkflowStage::Learn);
}

#[tokio::test]
async fn invalid_slot_map_writes_nothing() {
    let engine = engine(board());
    let mut map = SlotMap::new();
    map.push(WorkflowStage::Plan, 1u64, Some(3));

    let err = engine
        .reconcile(COLLECTION, &map)
        .await
        .expect_err("invalid map");
    assert!(matches!(err, OrderingError::InvalidSlotMap(_)));
    assert_eq!(engine.store().add_calls(), 0);
    assert_eq!(
        engine.store().tags(1).await,
        vec!["bug", "priority-5", "status-build"]
    );
}

#[tokio::test(start_paused = true)]
async fn stalled_listing_times_out() {
    let store = board();
    store.stall_lists(Duration::from_secs(60));
    let engine = OrderingEngine::new(
        store,
        EngineConfig {
            call_timeout: Duration::from_millis(250),
            ..EngineConfig::default()
        },
    );

    let err = engine
        .reconcile(COLLECTION, &slot_map())
        .await
        .expect_err("timeout");
    assert!(matches!(
        err,
        OrderingError::Store(bml_core::StoreError::Timeout(_))
    ));

    let err = engine
        .move_above(COLLECTION, &id(1), &id(9))
        .await
        .expect_err("timeout");
    assert!(matches!(
        err,
        OrderingError::Store(bml_core::StoreError::Timeout(_))
    ));
    assert_eq!(engine.store().add_calls(), 0);
}
