//! Integration tests for TTL retention.

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::*;
use devmesh_core::db::EventFilter;
use devmesh_core::retention::run_retention;

#[tokio::test]
async fn retention_removes_old_events_and_their_templates() {
    let Some(store) = test_store().await else {
        return;
    };
    let store = Arc::new(store);
    let (pipeline, _) = test_pipeline(store.clone());

    // Five shapes, all well past the horizon.
    let old = Utc::now() - Duration::seconds(60);
    let mut batch = Vec::new();
    for shape in 0..5 {
        for i in 0..20 {
            batch.push(event(
                "svc",
                "node-1",
                &format!("shape {shape} item number {}", 10_000 + shape * 100 + i),
                old + Duration::microseconds((shape * 100 + i) as i64),
            ));
        }
    }
    let report = pipeline.ingest(batch).await.expect("ingest");
    assert_eq!(report.accepted, 100);
    assert_eq!(store.count_templates().await.expect("count"), 5);

    // Dry run previews without deleting.
    let preview = run_retention(&store, Duration::seconds(1), 30, true)
        .await
        .expect("dry run");
    assert_eq!(preview.would_delete, Some(100));
    assert_eq!(store.count_events().await.expect("count"), 100);

    let report = run_retention(&store, Duration::seconds(1), 30, false)
        .await
        .expect("retention");
    assert_eq!(report.events_deleted, 100);
    assert_eq!(report.templates_deleted, 5);
    // 100 rows at batch size 30 -> 4 delete batches.
    assert_eq!(report.batches, 4);

    assert_eq!(store.count_events().await.expect("count"), 0);
    assert_eq!(store.count_templates().await.expect("count"), 0);
}

#[tokio::test]
async fn retention_keeps_templates_still_referenced() {
    let Some(store) = test_store().await else {
        return;
    };
    let store = Arc::new(store);
    let (pipeline, _) = test_pipeline(store.clone());

    let old = Utc::now() - Duration::days(10);
    let fresh = Utc::now() - Duration::seconds(5);
    // Same shape, one event far outside the horizon and one inside it.
    let report = pipeline
        .ingest(vec![
            event("svc", "node-1", "pid=1 heartbeat", old),
            event("svc", "node-1", "pid=2 heartbeat", fresh),
        ])
        .await
        .expect("ingest");
    assert_eq!(report.accepted, 2);

    let result = run_retention(&store, Duration::days(1), 100, false)
        .await
        .expect("retention");
    assert_eq!(result.events_deleted, 1);
    assert_eq!(result.templates_deleted, 0);

    let remaining = store
        .query_events(&EventFilter::default())
        .await
        .expect("query");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].timestamp.timestamp(), fresh.timestamp());
    assert_eq!(store.count_templates().await.expect("count"), 1);
}

#[tokio::test]
async fn retention_is_a_noop_on_fresh_data() {
    let Some(store) = test_store().await else {
        return;
    };
    let store = Arc::new(store);
    let (pipeline, _) = test_pipeline(store.clone());

    pipeline
        .ingest(vec![event("svc", "node-1", "fresh line", Utc::now())])
        .await
        .expect("ingest");

    let report = run_retention(&store, Duration::days(90), 100, false)
        .await
        .expect("retention");
    assert_eq!(report.events_deleted, 0);
    assert_eq!(report.templates_deleted, 0);
    assert_eq!(store.count_events().await.expect("count"), 1);
}
