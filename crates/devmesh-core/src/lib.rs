//! devmesh-core: AI-native observability for self-hosted fleets
//!
//! This crate provides the ingestion, canonicalization, template
//! deduplication, embedding, and semantic-search pipeline over system
//! journal events, together with its Postgres/pgvector storage layer.

pub mod backfill;
pub mod cache;
pub mod canon;
pub mod config;
pub mod db;
pub mod embed;
pub mod error;
pub mod ingest;
pub mod models;
pub mod retention;
pub mod schema;
pub mod search;

pub use cache::TemplateCache;
pub use config::Config;
pub use db::Store;
pub use embed::EmbeddingClient;
pub use error::Error;
pub use error::Result;
pub use ingest::IngestPipeline;
pub use search::SearchLayer;

/// Application name used for config directories and paths.
pub const APP_NAME: &str = "devmesh";
