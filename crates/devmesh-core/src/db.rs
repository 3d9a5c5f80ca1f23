//! Durable store operations for devmesh.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};

use crate::error::Result;
use crate::models::*;
use crate::schema::{schema_sql, vector_index_sql, MAX_HALFVEC_DIM, MAX_HNSW_DIM};
use crate::Error;

/// Store handle for devmesh. Wraps the process-wide connection pool.
pub struct Store {
    pool: PgPool,
    embedding_dim: u32,
}

impl Store {
    /// Connect to the database at the given URL and ensure the schema.
    pub async fn connect(url: &str, embedding_dim: u32, max_connections: u32) -> Result<Self> {
        let options = PgConnectOptions::from_str(url)?;
        Self::connect_with(options, embedding_dim, max_connections).await
    }

    /// Connect with explicit options (used by tests to pin a search_path).
    pub async fn connect_with(
        options: PgConnectOptions,
        embedding_dim: u32,
        max_connections: u32,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self {
            pool,
            embedding_dim,
        };
        store.init().await?;
        Ok(store)
    }

    /// Initialize schema.
    async fn init(&self) -> Result<()> {
        sqlx::raw_sql(&schema_sql(self.embedding_dim))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Build the ANN index over template embeddings. Called after an initial
    /// embedding backfill rather than at schema creation.
    pub async fn ensure_vector_index(&self) -> Result<()> {
        sqlx::raw_sql(&vector_index_sql(self.embedding_dim))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close the store.
    pub async fn close(self) {
        self.pool.close().await;
    }

    // Cosine distance expression matching the ANN index definition, so the
    // planner can use the index. Above the halfvec ceiling the index covers
    // only a prefix of the vector; this expression ranks by that prefix and
    // the search methods re-rank the shortlist by exact distance.
    fn ann_distance_expr(&self) -> String {
        let dim = self.embedding_dim;
        if dim <= MAX_HNSW_DIM {
            "(embedding <=> $1)".to_string()
        } else if dim <= MAX_HALFVEC_DIM {
            format!("(embedding::halfvec({dim}) <=> $1::halfvec({dim}))")
        } else {
            let prefix = MAX_HALFVEC_DIM;
            format!(
                "(subvector(embedding, 1, {prefix})::halfvec({prefix}) <=> \
                 subvector($1, 1, {prefix})::halfvec({prefix}))"
            )
        }
    }

    fn needs_exact_rerank(&self) -> bool {
        self.embedding_dim > MAX_HALFVEC_DIM
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Return the subset of the given log hashes that already exist.
    pub async fn existing_log_hashes(&self, hashes: &[String]) -> Result<HashSet<String>> {
        if hashes.is_empty() {
            return Ok(HashSet::new());
        }
        let rows = sqlx::query("SELECT log_hash FROM log_events WHERE log_hash = ANY($1)")
            .bind(hashes)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|row| row.get("log_hash")).collect())
    }

    /// Insert a batch of events in one transaction.
    ///
    /// Returns one entry per input row: the assigned id, or None when the row
    /// was dropped as a duplicate (unique violation on log_hash, resolved by
    /// the store rather than by locking). Insert order within the batch is
    /// preserved in id assignment.
    pub async fn insert_events(&self, rows: &[EventInsert]) -> Result<Vec<Option<i64>>> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            let id: Option<i64> = sqlx::query_scalar(
                r#"
                INSERT INTO log_events (
                    log_hash, timestamp, source, service, host, level,
                    message, trace_id, span_id, event_type, error_code,
                    meta, template_id
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                ON CONFLICT (log_hash) DO NOTHING
                RETURNING id
                "#,
            )
            .bind(&row.log_hash)
            .bind(row.event.timestamp)
            .bind(&row.event.source)
            .bind(&row.event.service)
            .bind(&row.event.host)
            .bind(row.event.level.as_str())
            .bind(&row.event.message)
            .bind(&row.event.trace_id)
            .bind(&row.event.span_id)
            .bind(&row.event.event_type)
            .bind(&row.event.error_code)
            .bind(&row.event.meta)
            .bind(row.template_id)
            .fetch_optional(&mut *tx)
            .await?;
            ids.push(id);
        }
        tx.commit().await?;
        Ok(ids)
    }

    /// Relational event query with optional filters and pagination.
    pub async fn query_events(&self, filter: &EventFilter) -> Result<Vec<LogEvent>> {
        let mut sql = String::from("SELECT * FROM log_events WHERE 1=1");
        let mut arg = 0;

        if filter.service.is_some() {
            arg += 1;
            sql.push_str(&format!(" AND service = ${arg}"));
        }
        if filter.host.is_some() {
            arg += 1;
            sql.push_str(&format!(" AND host = ${arg}"));
        }
        if filter.level.is_some() {
            arg += 1;
            sql.push_str(&format!(" AND level = ${arg}"));
        }
        if filter.start.is_some() {
            arg += 1;
            sql.push_str(&format!(" AND timestamp >= ${arg}"));
        }
        if filter.end.is_some() {
            arg += 1;
            sql.push_str(&format!(" AND timestamp <= ${arg}"));
        }

        let limit = filter.limit.clamp(1, EventFilter::MAX_LIMIT);
        let offset = filter.offset.max(0);
        sql.push_str(&format!(
            " ORDER BY timestamp DESC LIMIT {limit} OFFSET {offset}"
        ));

        let mut query = sqlx::query(&sql);
        if let Some(ref service) = filter.service {
            query = query.bind(service);
        }
        if let Some(ref host) = filter.host {
            query = query.bind(host);
        }
        if let Some(level) = filter.level {
            query = query.bind(level.as_str());
        }
        if let Some(start) = filter.start {
            query = query.bind(start);
        }
        if let Some(end) = filter.end {
            query = query.bind(end);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(event_from_row).collect()
    }

    /// Fetch up to `per_template_limit` recent events for each template id,
    /// within an optional time window.
    pub async fn sample_events_by_template(
        &self,
        template_ids: &[i64],
        per_template_limit: i64,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<HashMap<i64, Vec<LogEvent>>> {
        let mut samples = HashMap::new();
        for &template_id in template_ids {
            let rows = sqlx::query(
                r#"
                SELECT * FROM log_events
                WHERE template_id = $1
                  AND ($2::timestamptz IS NULL OR timestamp >= $2)
                  AND ($3::timestamptz IS NULL OR timestamp <= $3)
                ORDER BY timestamp DESC
                LIMIT $4
                "#,
            )
            .bind(template_id)
            .bind(start)
            .bind(end)
            .bind(per_template_limit)
            .fetch_all(&self.pool)
            .await?;

            let events: Result<Vec<LogEvent>> = rows.iter().map(event_from_row).collect();
            samples.insert(template_id, events?);
        }
        Ok(samples)
    }

    /// Legacy event-level vector search over rows that carry an embedding.
    pub async fn search_events_by_vector(
        &self,
        query_vector: &[f32],
        limit: i64,
        filter: &SearchFilter,
    ) -> Result<Vec<(LogEvent, f64)>> {
        let ann = self.ann_distance_expr();
        let limit = limit.max(1);
        let mut conditions = String::new();
        let mut arg = 1;

        if filter.service.is_some() {
            arg += 1;
            conditions.push_str(&format!(" AND service = ${arg}"));
        }
        if filter.level.is_some() {
            arg += 1;
            conditions.push_str(&format!(" AND level = ${arg}"));
        }
        if filter.start.is_some() {
            arg += 1;
            conditions.push_str(&format!(" AND timestamp >= ${arg}"));
        }
        if filter.end.is_some() {
            arg += 1;
            conditions.push_str(&format!(" AND timestamp <= ${arg}"));
        }

        let sql = if self.needs_exact_rerank() {
            let shortlist = limit.saturating_mul(4);
            format!(
                "SELECT * FROM ( \
                     SELECT *, (embedding <=> $1) AS distance FROM log_events \
                     WHERE embedding IS NOT NULL{conditions} \
                     ORDER BY {ann} LIMIT {shortlist} \
                 ) AS shortlist \
                 ORDER BY distance, timestamp DESC, id ASC LIMIT {limit}"
            )
        } else {
            format!(
                "SELECT *, {ann} AS distance FROM log_events \
                 WHERE embedding IS NOT NULL{conditions} \
                 ORDER BY {ann}, timestamp DESC, id ASC LIMIT {limit}"
            )
        };

        let mut query = sqlx::query(&sql).bind(Vector::from(query_vector.to_vec()));
        if let Some(ref service) = filter.service {
            query = query.bind(service);
        }
        if let Some(level) = filter.level {
            query = query.bind(level.as_str());
        }
        if let Some(start) = filter.start {
            query = query.bind(start);
        }
        if let Some(end) = filter.end {
            query = query.bind(end);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| Ok((event_from_row(row)?, row.get::<f64, _>("distance"))))
            .collect()
    }

    /// Scan events missing a template assignment, above an id cursor.
    pub async fn events_missing_template(&self, cursor: i64, limit: i64) -> Result<Vec<LogEvent>> {
        let rows = sqlx::query(
            "SELECT * FROM log_events WHERE id > $1 AND template_id IS NULL ORDER BY id LIMIT $2",
        )
        .bind(cursor)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(event_from_row).collect()
    }

    /// Write-once template assignment: only fills a NULL slot. Returns
    /// whether this call did the write (false when another writer won).
    pub async fn set_event_template(&self, event_id: i64, template_id: i64) -> Result<bool> {
        let result =
            sqlx::query("UPDATE log_events SET template_id = $2 WHERE id = $1 AND template_id IS NULL")
                .bind(event_id)
                .bind(template_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Count events older than the cutoff (retention preview).
    pub async fn count_events_before(&self, cutoff: DateTime<Utc>) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM log_events WHERE timestamp < $1")
                .bind(cutoff)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.0)
    }

    /// Delete one batch of events older than the cutoff. Batched so retention
    /// never holds a long transaction over the hot table.
    pub async fn delete_events_before(&self, cutoff: DateTime<Utc>, batch: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM log_events
            WHERE id IN (
                SELECT id FROM log_events WHERE timestamp < $1 ORDER BY id LIMIT $2
            )
            "#,
        )
        .bind(cutoff)
        .bind(batch)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Get event count.
    pub async fn count_events(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM log_events")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    // =========================================================================
    // Templates
    // =========================================================================

    /// Look up a template id by hash.
    pub async fn lookup_template(&self, template_hash: &str) -> Result<Option<i64>> {
        let id: Option<i64> =
            sqlx::query_scalar("SELECT id FROM log_templates WHERE template_hash = $1")
                .bind(template_hash)
                .fetch_optional(&self.pool)
                .await?;
        Ok(id)
    }

    /// Get a template by id.
    pub async fn get_template(&self, id: i64) -> Result<Option<Template>> {
        let row = sqlx::query("SELECT * FROM log_templates WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(template_from_row).transpose()
    }

    /// Get a template by hash.
    pub async fn get_template_by_hash(&self, template_hash: &str) -> Result<Option<Template>> {
        let row = sqlx::query("SELECT * FROM log_templates WHERE template_hash = $1")
            .bind(template_hash)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(template_from_row).transpose()
    }

    /// Atomic insert-or-fetch of a template row.
    ///
    /// On concurrent first-sight of the same hash exactly one row is created;
    /// losers converge on the winner's id via re-lookup. The row starts with
    /// event_count = 0 and a NULL embedding; counters and vector are attached
    /// by the caller once its events have landed.
    pub async fn create_template_if_absent(&self, new: &NewTemplate) -> Result<(i64, bool)> {
        for _ in 0..3 {
            let inserted: Option<i64> = sqlx::query_scalar(
                r#"
                INSERT INTO log_templates (
                    template_hash, canonical_text, service, level,
                    canon_version, canon_hash, chunk_version,
                    event_count, first_seen, last_seen, source_hosts
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, 0, $8, $8, $9)
                ON CONFLICT (template_hash) DO NOTHING
                RETURNING id
                "#,
            )
            .bind(&new.template_hash)
            .bind(&new.canonical_text)
            .bind(&new.service)
            .bind(new.level.as_str())
            .bind(&new.canon_version)
            .bind(&new.canon_hash)
            .bind(&new.chunk_version)
            .bind(new.first_seen)
            .bind(serde_json::json!([new.host]))
            .fetch_optional(&self.pool)
            .await?;

            if let Some(id) = inserted {
                return Ok((id, true));
            }
            if let Some(id) = self.lookup_template(&new.template_hash).await? {
                return Ok((id, false));
            }
            // The winning row vanished between insert and lookup (retention
            // race); take another round.
        }
        Err(Error::Other(format!(
            "template create did not converge for hash {}",
            new.template_hash
        )))
    }

    /// Attach an embedding vector to a template. Idempotent under the same
    /// (model, dim); never overwrites a vector from a different generation.
    pub async fn attach_embedding(
        &self,
        template_id: i64,
        vector: &[f32],
        model: &str,
        dim: i32,
    ) -> Result<()> {
        if vector.len() != dim as usize {
            return Err(Error::DimensionMismatch {
                expected: dim as usize,
                got: vector.len(),
            });
        }
        sqlx::query(
            r#"
            UPDATE log_templates
            SET embedding = $2, embedding_model = $3, embedding_dim = $4, updated_at = now()
            WHERE id = $1
              AND (embedding IS NULL OR (embedding_model = $3 AND embedding_dim = $4))
            "#,
        )
        .bind(template_id)
        .bind(Vector::from(vector.to_vec()))
        .bind(model)
        .bind(dim)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Replace a template's embedding during a versioned migration. Unlike
    /// attach_embedding this overwrites vectors from older generations.
    pub async fn migrate_embedding(
        &self,
        template_id: i64,
        vector: &[f32],
        model: &str,
        dim: i32,
    ) -> Result<()> {
        if vector.len() != dim as usize {
            return Err(Error::DimensionMismatch {
                expected: dim as usize,
                got: vector.len(),
            });
        }
        sqlx::query(
            r#"
            UPDATE log_templates
            SET embedding = $2, embedding_model = $3, embedding_dim = $4, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(template_id)
        .bind(Vector::from(vector.to_vec()))
        .bind(model)
        .bind(dim)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fold a batch of matching events into a template's counters: the count
    /// grows, the seen interval widens, the host set unions. Commutative, so
    /// inter-batch interleaving is safe.
    pub async fn bump_template_counters(
        &self,
        template_id: i64,
        newly_accepted: i64,
        first: DateTime<Utc>,
        last: DateTime<Utc>,
        hosts: &[String],
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE log_templates
            SET event_count = event_count + $2,
                first_seen = LEAST(first_seen, $3),
                last_seen = GREATEST(last_seen, $4),
                source_hosts = (
                    SELECT jsonb_agg(DISTINCT value)
                    FROM jsonb_array_elements_text(COALESCE(source_hosts, '[]'::jsonb) || $5)
                    AS t(value)
                ),
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(template_id)
        .bind(newly_accepted)
        .bind(first)
        .bind(last)
        .bind(serde_json::json!(hosts))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Cosine ANN search over template embeddings. Service/level/time filters
    /// are applied as SQL post-filters; ties break by recency then id.
    pub async fn vector_search_templates(
        &self,
        query_vector: &[f32],
        limit: i64,
        filter: &SearchFilter,
    ) -> Result<Vec<(Template, f64)>> {
        let ann = self.ann_distance_expr();
        let limit = limit.max(1);
        let mut conditions = String::new();
        let mut arg = 1;

        if filter.service.is_some() {
            arg += 1;
            conditions.push_str(&format!(" AND service = ${arg}"));
        }
        if filter.level.is_some() {
            arg += 1;
            conditions.push_str(&format!(" AND level = ${arg}"));
        }
        // Templates whose activity interval overlaps the window.
        if filter.start.is_some() {
            arg += 1;
            conditions.push_str(&format!(" AND last_seen >= ${arg}"));
        }
        if filter.end.is_some() {
            arg += 1;
            conditions.push_str(&format!(" AND first_seen <= ${arg}"));
        }

        let sql = if self.needs_exact_rerank() {
            let shortlist = limit.saturating_mul(4);
            format!(
                "SELECT * FROM ( \
                     SELECT *, (embedding <=> $1) AS distance FROM log_templates \
                     WHERE embedding IS NOT NULL{conditions} \
                     ORDER BY {ann} LIMIT {shortlist} \
                 ) AS shortlist \
                 ORDER BY distance, last_seen DESC, id ASC LIMIT {limit}"
            )
        } else {
            format!(
                "SELECT *, {ann} AS distance FROM log_templates \
                 WHERE embedding IS NOT NULL{conditions} \
                 ORDER BY {ann}, last_seen DESC, id ASC LIMIT {limit}"
            )
        };

        let mut query = sqlx::query(&sql).bind(Vector::from(query_vector.to_vec()));
        if let Some(ref service) = filter.service {
            query = query.bind(service);
        }
        if let Some(level) = filter.level {
            query = query.bind(level.as_str());
        }
        if let Some(start) = filter.start {
            query = query.bind(start);
        }
        if let Some(end) = filter.end {
            query = query.bind(end);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| Ok((template_from_row(row)?, row.get::<f64, _>("distance"))))
            .collect()
    }

    /// The n most recently updated (template_hash, id) pairs, for cache
    /// warming at startup.
    pub async fn recent_templates(&self, n: i64) -> Result<Vec<(String, i64)>> {
        let rows =
            sqlx::query("SELECT template_hash, id FROM log_templates ORDER BY updated_at DESC LIMIT $1")
                .bind(n)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .iter()
            .map(|row| (row.get("template_hash"), row.get("id")))
            .collect())
    }

    /// Scan templates missing an embedding, above an id cursor.
    pub async fn templates_missing_embedding(
        &self,
        cursor: i64,
        limit: i64,
    ) -> Result<Vec<Template>> {
        let rows = sqlx::query(
            "SELECT * FROM log_templates WHERE id > $1 AND embedding IS NULL ORDER BY id LIMIT $2",
        )
        .bind(cursor)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(template_from_row).collect()
    }

    /// Scan templates whose embedding is missing or from a stale pipeline
    /// generation (version bump migrations).
    pub async fn templates_stale(
        &self,
        canon_version: &str,
        embedding_model: &str,
        cursor: i64,
        limit: i64,
    ) -> Result<Vec<Template>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM log_templates
            WHERE id > $1
              AND (embedding IS NULL
                   OR canon_version <> $2
                   OR embedding_model IS DISTINCT FROM $3)
            ORDER BY id LIMIT $4
            "#,
        )
        .bind(cursor)
        .bind(canon_version)
        .bind(embedding_model)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(template_from_row).collect()
    }

    /// Delete templates outside the retention horizon that no remaining
    /// event references. The NOT EXISTS guard keeps retention append-safe.
    pub async fn delete_unreferenced_templates_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM log_templates t
            WHERE t.last_seen < $1
              AND NOT EXISTS (SELECT 1 FROM log_events e WHERE e.template_id = t.id)
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Get template count.
    pub async fn count_templates(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM log_templates")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    /// Count templates still missing an embedding.
    pub async fn count_templates_missing_embedding(&self) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM log_templates WHERE embedding IS NULL")
                .fetch_one(&self.pool)
                .await?;
        Ok(count.0)
    }
}

/// One event prepared for insertion: validated input plus its fingerprint
/// and (possibly null) template assignment.
#[derive(Debug, Clone)]
pub struct EventInsert {
    pub event: NewLogEvent,
    pub log_hash: String,
    pub template_id: Option<i64>,
}

/// Filters for relational event queries.
#[derive(Debug, Clone)]
pub struct EventFilter {
    pub service: Option<String>,
    pub host: Option<String>,
    pub level: Option<LogLevel>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl EventFilter {
    pub const MAX_LIMIT: i64 = 10_000;
}

impl Default for EventFilter {
    fn default() -> Self {
        Self {
            service: None,
            host: None,
            level: None,
            start: None,
            end: None,
            limit: 100,
            offset: 0,
        }
    }
}

/// Filters shared by the vector search paths.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub service: Option<String>,
    pub level: Option<LogLevel>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

fn event_from_row(row: &PgRow) -> Result<LogEvent> {
    Ok(LogEvent {
        id: row.get("id"),
        timestamp: row.get("timestamp"),
        source: row.get("source"),
        service: row.get("service"),
        host: row.get("host"),
        level: LogLevel::parse(row.get("level")).unwrap_or_default(),
        message: row.get("message"),
        trace_id: row.get("trace_id"),
        span_id: row.get("span_id"),
        event_type: row.get("event_type"),
        error_code: row.get("error_code"),
        meta: row.get("meta"),
        log_hash: row.get("log_hash"),
        template_id: row.get("template_id"),
    })
}

fn template_from_row(row: &PgRow) -> Result<Template> {
    Ok(Template {
        id: row.get("id"),
        template_hash: row.get("template_hash"),
        canonical_text: row.get("canonical_text"),
        service: row.get("service"),
        level: LogLevel::parse(row.get("level")).unwrap_or_default(),
        embedding: row
            .get::<Option<Vector>, _>("embedding")
            .map(|v| v.to_vec()),
        embedding_model: row.get("embedding_model"),
        embedding_dim: row.get("embedding_dim"),
        canon_version: row.get("canon_version"),
        canon_hash: row.get("canon_hash"),
        chunk_version: row.get("chunk_version"),
        event_count: row.get("event_count"),
        first_seen: row.get("first_seen"),
        last_seen: row.get("last_seen"),
        source_hosts: row.get("source_hosts"),
    })
}
