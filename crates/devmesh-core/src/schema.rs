//! Database schema for devmesh.

/// SQL schema, parameterized on the embedding dimension D.
///
/// The versioning columns (canon_version, embedding_model, embedding_dim,
/// chunk_version) are first-class from creation: unversioned embeddings are
/// unmigratable.
pub fn schema_sql(dim: u32) -> String {
    format!(
        r#"
CREATE EXTENSION IF NOT EXISTS vector;

CREATE TABLE IF NOT EXISTS log_templates (
    id BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
    template_hash VARCHAR(32) NOT NULL,
    canonical_text TEXT NOT NULL,
    service VARCHAR(255) NOT NULL,
    level VARCHAR(16) NOT NULL
        CHECK (level IN ('DEBUG','INFO','WARN','WARNING','ERROR','CRITICAL','FATAL')),
    embedding vector({dim}),
    embedding_model VARCHAR(100),
    embedding_dim INTEGER,
    canon_version VARCHAR(10) NOT NULL,
    canon_hash VARCHAR(32) NOT NULL,
    chunk_version VARCHAR(10) NOT NULL,
    event_count BIGINT NOT NULL DEFAULT 0,
    first_seen TIMESTAMPTZ NOT NULL,
    last_seen TIMESTAMPTZ NOT NULL,
    source_hosts JSONB,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_log_templates_hash ON log_templates (template_hash);
CREATE INDEX IF NOT EXISTS idx_log_templates_canon_version ON log_templates (canon_version);
CREATE INDEX IF NOT EXISTS idx_log_templates_service ON log_templates (service);
CREATE INDEX IF NOT EXISTS idx_log_templates_last_seen ON log_templates (last_seen);

CREATE TABLE IF NOT EXISTS log_events (
    id BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
    log_hash VARCHAR(32) NOT NULL,
    timestamp TIMESTAMPTZ NOT NULL,
    source VARCHAR(255) NOT NULL,
    service VARCHAR(255) NOT NULL,
    host VARCHAR(255) NOT NULL,
    level VARCHAR(16) NOT NULL
        CHECK (level IN ('DEBUG','INFO','WARN','WARNING','ERROR','CRITICAL','FATAL')),
    message TEXT NOT NULL,
    trace_id VARCHAR(64),
    span_id VARCHAR(32),
    event_type VARCHAR(100),
    error_code VARCHAR(50),
    meta JSONB,
    template_id BIGINT,
    embedding vector({dim}),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_log_events_log_hash ON log_events (log_hash);
CREATE INDEX IF NOT EXISTS idx_log_events_timestamp ON log_events (timestamp);
CREATE INDEX IF NOT EXISTS idx_log_events_service_ts ON log_events (service, timestamp);
CREATE INDEX IF NOT EXISTS idx_log_events_host_ts ON log_events (host, timestamp);
CREATE INDEX IF NOT EXISTS idx_log_events_level ON log_events (level);
CREATE INDEX IF NOT EXISTS idx_log_events_template_id ON log_events (template_id);
"#
    )
}

/// hnsw indexes full-precision vectors up to this many dimensions.
pub const MAX_HNSW_DIM: u32 = 2000;

/// hnsw indexes halfvec columns/expressions up to this many dimensions.
pub const MAX_HALFVEC_DIM: u32 = 4000;

/// DDL for the approximate-nearest-neighbor index over template embeddings.
///
/// Built separately from the base schema: the HNSW build is wasted work until
/// an initial embedding backfill has populated the column. hnsw caps out at
/// 2000 full-precision dimensions and 4000 through halfvec; models above
/// that (the 4096-dim deployment included) get an index over a halfvec
/// prefix of the vector. Queries shortlist by the same prefix expression and
/// re-rank the shortlist by exact distance.
pub fn vector_index_sql(dim: u32) -> String {
    if dim <= MAX_HNSW_DIM {
        "CREATE INDEX IF NOT EXISTS idx_log_templates_embedding ON log_templates \
         USING hnsw (embedding vector_cosine_ops)"
            .to_string()
    } else if dim <= MAX_HALFVEC_DIM {
        format!(
            "CREATE INDEX IF NOT EXISTS idx_log_templates_embedding ON log_templates \
             USING hnsw ((embedding::halfvec({dim})) halfvec_cosine_ops)"
        )
    } else {
        format!(
            "CREATE INDEX IF NOT EXISTS idx_log_templates_embedding ON log_templates \
             USING hnsw ((subvector(embedding, 1, {MAX_HALFVEC_DIM})::halfvec({MAX_HALFVEC_DIM})) halfvec_cosine_ops)"
        )
    }
}
