//! Integration tests for the ingest write path.

mod common;

use std::sync::Arc;

use chrono::Duration;
use common::*;
use devmesh_core::canon;
use devmesh_core::db::EventFilter;
use devmesh_core::models::LogLevel;

#[tokio::test]
async fn replaying_a_batch_adds_no_rows() {
    let Some(store) = test_store().await else {
        return;
    };
    let store = Arc::new(store);
    let (pipeline, _) = test_pipeline(store.clone());

    let ts = base_ts() + Duration::microseconds(1);
    let batch = vec![event("s", "h", "hello 1234", ts)];

    let first = pipeline.ingest(batch.clone()).await.expect("first ingest");
    assert_eq!(first.accepted, 1);
    assert_eq!(first.duplicates, 0);

    let second = pipeline.ingest(batch).await.expect("second ingest");
    assert_eq!(second.accepted, 0);
    assert_eq!(second.duplicates, 1);

    assert_eq!(store.count_events().await.expect("count"), 1);
    assert_eq!(store.count_templates().await.expect("count"), 1);

    let hash = canon::template_hash("s", LogLevel::Info, "v1", "hello <N>");
    let template = store
        .get_template_by_hash(&hash)
        .await
        .expect("get")
        .expect("template exists");
    assert_eq!(template.canonical_text, "hello <N>");
    assert_eq!(template.event_count, 1);
}

#[tokio::test]
async fn events_with_shared_shape_share_one_template() {
    let Some(store) = test_store().await else {
        return;
    };
    let store = Arc::new(store);
    let (pipeline, _) = test_pipeline(store.clone());

    let batch = vec![
        event("s", "h", "pid=17 open file /a", base_ts()),
        event("s", "h", "pid=998 open file /a", base_ts() + Duration::seconds(1)),
    ];
    let report = pipeline.ingest(batch).await.expect("ingest");
    assert_eq!(report.accepted, 2);

    assert_eq!(store.count_events().await.expect("count"), 2);
    assert_eq!(store.count_templates().await.expect("count"), 1);

    let hash = canon::template_hash("s", LogLevel::Info, "v1", "pid=<PID> open file /a");
    let template = store
        .get_template_by_hash(&hash)
        .await
        .expect("get")
        .expect("template exists");
    assert_eq!(template.canonical_text, "pid=<PID> open file /a");
    assert_eq!(template.event_count, 2);
    assert_eq!(template.first_seen, base_ts());
    assert_eq!(template.last_seen, base_ts() + Duration::seconds(1));
}

#[tokio::test]
async fn empty_batch_is_accepted_with_zero_counts() {
    let Some(store) = test_store().await else {
        return;
    };
    let store = Arc::new(store);
    let (pipeline, _) = test_pipeline(store.clone());

    let report = pipeline.ingest(Vec::new()).await.expect("ingest");
    assert_eq!(report.accepted, 0);
    assert_eq!(report.duplicates, 0);
    assert_eq!(report.failed, 0);
}

#[tokio::test]
async fn duplicates_within_one_batch_collapse() {
    let Some(store) = test_store().await else {
        return;
    };
    let store = Arc::new(store);
    let (pipeline, _) = test_pipeline(store.clone());

    let one = event("s", "h", "same line", base_ts());
    let report = pipeline
        .ingest(vec![one.clone(), one])
        .await
        .expect("ingest");
    assert_eq!(report.accepted, 1);
    assert_eq!(report.duplicates, 1);
    assert_eq!(store.count_events().await.expect("count"), 1);
}

#[tokio::test]
async fn validation_failures_do_not_fail_the_batch() {
    let Some(store) = test_store().await else {
        return;
    };
    let store = Arc::new(store);
    let (pipeline, _) = test_pipeline(store.clone());

    let mut bad = event("s", "h", "broken", base_ts());
    bad.service = String::new();
    let good = event("s", "h", "fine 99999", base_ts());

    let report = pipeline.ingest(vec![bad, good]).await.expect("ingest");
    assert_eq!(report.failed, 1);
    assert_eq!(report.accepted, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].index, 0);
    assert!(report.errors[0].reason.contains("service"));
}

#[tokio::test]
async fn embedding_outage_defers_but_persists_everything() {
    let Some(store) = test_store().await else {
        return;
    };
    let store = Arc::new(store);
    // test_pipeline wires an embedder pointed at a closed port.
    let (pipeline, _) = test_pipeline(store.clone());

    let report = pipeline
        .ingest(vec![event("s", "h", "novel shape 77777", base_ts())])
        .await
        .expect("ingest");
    assert_eq!(report.accepted, 1);
    assert_eq!(report.embeddings_deferred, 1);

    let hash = canon::template_hash("s", LogLevel::Info, "v1", "novel shape <N>");
    let template = store
        .get_template_by_hash(&hash)
        .await
        .expect("get")
        .expect("template exists");
    assert!(template.embedding.is_none());

    let events = store
        .query_events(&EventFilter::default())
        .await
        .expect("query");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].template_id, Some(template.id));

    // The embedding arriving later (safety net) touches no event rows.
    store
        .attach_embedding(template.id, &vec![0.5; TEST_DIM as usize], "test-embed", TEST_DIM as i32)
        .await
        .expect("attach");
    let template = store
        .get_template(template.id)
        .await
        .expect("get")
        .expect("exists");
    assert_eq!(template.embedding.as_deref(), Some(&vec![0.5; TEST_DIM as usize][..]));

    let events_after = store
        .query_events(&EventFilter::default())
        .await
        .expect("query");
    assert_eq!(events_after.len(), 1);
    assert_eq!(events_after[0].id, events[0].id);
    assert_eq!(events_after[0].template_id, events[0].template_id);
}

#[tokio::test]
async fn relational_query_filters_and_paginates() {
    let Some(store) = test_store().await else {
        return;
    };
    let store = Arc::new(store);
    let (pipeline, _) = test_pipeline(store.clone());

    let mut batch = Vec::new();
    for i in 0..6 {
        let service = if i % 2 == 0 { "nginx" } else { "redis" };
        let host = if i < 3 { "node-1" } else { "node-2" };
        batch.push(event(
            service,
            host,
            &format!("request {i} done"),
            base_ts() + Duration::seconds(i),
        ));
    }
    let report = pipeline.ingest(batch).await.expect("ingest");
    assert_eq!(report.accepted, 6);

    let nginx_only = store
        .query_events(&EventFilter {
            service: Some("nginx".to_string()),
            ..Default::default()
        })
        .await
        .expect("query");
    assert_eq!(nginx_only.len(), 3);
    assert!(nginx_only.iter().all(|e| e.service == "nginx"));

    let node2_only = store
        .query_events(&EventFilter {
            host: Some("node-2".to_string()),
            ..Default::default()
        })
        .await
        .expect("query");
    assert_eq!(node2_only.len(), 3);

    let windowed = store
        .query_events(&EventFilter {
            start: Some(base_ts() + Duration::seconds(2)),
            end: Some(base_ts() + Duration::seconds(4)),
            ..Default::default()
        })
        .await
        .expect("query");
    assert_eq!(windowed.len(), 3);

    // Newest first, pagination walks backwards in time.
    let page = store
        .query_events(&EventFilter {
            limit: 2,
            offset: 1,
            ..Default::default()
        })
        .await
        .expect("query");
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].timestamp, base_ts() + Duration::seconds(4));
    assert_eq!(page[1].timestamp, base_ts() + Duration::seconds(3));
}

#[tokio::test]
async fn raw_message_bytes_survive_storage() {
    let Some(store) = test_store().await else {
        return;
    };
    let store = Arc::new(store);
    let (pipeline, _) = test_pipeline(store.clone());

    let raw = "größe exceeded\r\nnext line";
    let report = pipeline
        .ingest(vec![event("s", "h", raw, base_ts())])
        .await
        .expect("ingest");
    assert_eq!(report.accepted, 1);

    let events = store
        .query_events(&EventFilter::default())
        .await
        .expect("query");
    assert_eq!(events[0].message, raw);

    // While the canonical form is normalized.
    let template = store
        .get_template(events[0].template_id.expect("linked"))
        .await
        .expect("get")
        .expect("exists");
    assert_eq!(template.canonical_text, "größe exceeded next line");
}
