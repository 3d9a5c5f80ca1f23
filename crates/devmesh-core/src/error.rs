//! Error types for devmesh-core

use thiserror::Error;

/// Core library error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown canonicalization version: {0}")]
    CanonVersion(String),

    #[error("Embedding backend unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Ingest queue full")]
    Busy,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias using Error.
pub type Result<T> = std::result::Result<T, Error>;
