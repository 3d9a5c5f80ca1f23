//! Shared helpers for Postgres-backed integration tests.
//!
//! Tests run only when DEVMESH_TEST_DATABASE_URL points at a Postgres with
//! the pgvector extension available; otherwise they skip (CI condition).
//! Each test gets its own schema so tests can run concurrently.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use sqlx::postgres::PgConnectOptions;

use devmesh_core::config::{EmbeddingConfig, IngestConfig};
use devmesh_core::models::{LogLevel, NewLogEvent};
use devmesh_core::{EmbeddingClient, IngestPipeline, Store, TemplateCache};

/// Small dimension keeps test vectors readable.
pub const TEST_DIM: u32 = 8;

pub async fn test_store() -> Option<Store> {
    let url = match std::env::var("DEVMESH_TEST_DATABASE_URL") {
        Ok(url) if !url.is_empty() => url,
        _ => {
            eprintln!("DEVMESH_TEST_DATABASE_URL not set; skipping integration test");
            return None;
        }
    };

    let schema = format!("devmesh_test_{}", uuid::Uuid::new_v4().simple());
    let admin = sqlx::PgPool::connect(&url).await.expect("connect");
    sqlx::query(&format!("CREATE SCHEMA \"{schema}\""))
        .execute(&admin)
        .await
        .expect("create schema");
    admin.close().await;

    let search_path = format!("{schema},public");
    let options = PgConnectOptions::from_str(&url)
        .expect("parse url")
        .options([("search_path", search_path.as_str())]);
    Some(
        Store::connect_with(options, TEST_DIM, 5)
            .await
            .expect("open store"),
    )
}

/// An embedding client pointed at a closed port: every call fails fast with
/// embedding-unavailable, exercising the degraded paths.
pub fn dead_embedder() -> Arc<EmbeddingClient> {
    let config = EmbeddingConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        model: "test-embed".to_string(),
        dim: TEST_DIM,
        timeout_secs: 1,
        batch_size: 50,
        max_concurrency: 1,
        max_retries: 0,
        batch_delay_ms: 0,
    };
    Arc::new(EmbeddingClient::new(config).expect("build client"))
}

pub fn test_pipeline(store: Arc<Store>) -> (IngestPipeline, Arc<TemplateCache>) {
    let cache = Arc::new(TemplateCache::new(1024));
    let pipeline = IngestPipeline::new(
        store,
        cache.clone(),
        dead_embedder(),
        IngestConfig::default(),
        "v1".to_string(),
        "v1".to_string(),
    );
    (pipeline, cache)
}

pub fn base_ts() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()
}

pub fn event(service: &str, host: &str, message: &str, ts: DateTime<Utc>) -> NewLogEvent {
    NewLogEvent {
        timestamp: ts,
        source: "journald".to_string(),
        service: service.to_string(),
        host: host.to_string(),
        level: LogLevel::Info,
        message: message.to_string(),
        trace_id: None,
        span_id: None,
        event_type: None,
        error_code: None,
        meta: None,
    }
}
