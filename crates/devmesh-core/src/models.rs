//! Domain models for log events and canonical templates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Log severity levels accepted on ingest.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Warning,
    Error,
    Critical,
    Fatal,
}

impl LogLevel {
    /// Canonical uppercase form stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
            LogLevel::Fatal => "FATAL",
        }
    }

    /// Parse a stored level. Unknown strings are rejected (closed enum).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DEBUG" => Some(LogLevel::Debug),
            "INFO" => Some(LogLevel::Info),
            "WARN" => Some(LogLevel::Warn),
            "WARNING" => Some(LogLevel::Warning),
            "ERROR" => Some(LogLevel::Error),
            "CRITICAL" => Some(LogLevel::Critical),
            "FATAL" => Some(LogLevel::Fatal),
            _ => None,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate log event as submitted by a shipper (no id, no hash yet).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLogEvent {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub service: String,
    pub host: String,
    pub level: LogLevel,
    pub message: String,
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub span_id: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub meta: Option<serde_json::Value>,
}

/// A stored log event, immutable after insert (template_id filled once).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub service: String,
    pub host: String,
    pub level: LogLevel,
    pub message: String,
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub event_type: Option<String>,
    pub error_code: Option<String>,
    pub meta: Option<serde_json::Value>,
    pub log_hash: String,
    pub template_id: Option<i64>,
}

/// A canonical log template: the deduplicated unit of memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: i64,
    pub template_hash: String,
    pub canonical_text: String,
    pub service: String,
    pub level: LogLevel,
    /// Transiently absent until the embedding backend attaches a vector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub embedding_model: Option<String>,
    pub embedding_dim: Option<i32>,
    pub canon_version: String,
    pub canon_hash: String,
    pub chunk_version: String,
    pub event_count: i64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub source_hosts: Option<serde_json::Value>,
}

/// Fields needed to create a template row (embedding attached separately).
#[derive(Debug, Clone)]
pub struct NewTemplate {
    pub template_hash: String,
    pub canonical_text: String,
    pub service: String,
    pub level: LogLevel,
    pub canon_version: String,
    pub canon_hash: String,
    pub chunk_version: String,
    pub first_seen: DateTime<Utc>,
    pub host: String,
}

/// Per-record ingest failure, surfaced in the batch response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestError {
    /// Index of the record within the submitted batch.
    pub index: usize,
    pub reason: String,
}

/// Outcome of one batch submission.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    pub accepted: usize,
    pub duplicates: usize,
    pub failed: usize,
    /// Templates persisted without a vector because the backend was down.
    pub embeddings_deferred: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<IngestError>,
}

#[cfg(test)]
#[path = "models_tests.rs"]
mod tests;
