//! Safety-net workers: complete template assignment and embeddings for rows
//! the live path left unfinished.
//!
//! Both jobs walk an id cursor ("last id processed") instead of re-querying
//! `WHERE col IS NULL ORDER BY id` from the start: the NULL-predicate plan
//! degrades as the NULL fraction shrinks. They tolerate concurrent live
//! ingest; insert-or-fetch and write-once semantics make every step a no-op
//! when another writer got there first.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;

use crate::cache::TemplateCache;
use crate::canon;
use crate::db::Store;
use crate::embed::EmbeddingClient;
use crate::error::Result;
use crate::models::{LogEvent, NewTemplate};

/// Knobs shared by both backfill jobs.
#[derive(Debug, Clone)]
pub struct BackfillOptions {
    /// Rows fetched per batch.
    pub batch_size: i64,
    /// Sleep between batches.
    pub delay: Duration,
    /// Safety cap on rows touched per run.
    pub max_rows: i64,
}

impl Default for BackfillOptions {
    fn default() -> Self {
        Self {
            batch_size: 100,
            delay: Duration::from_secs(2),
            max_rows: 10_000,
        }
    }
}

/// Outcome of a template backfill run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TemplateBackfillReport {
    pub scanned: usize,
    pub linked: usize,
    pub new_templates: usize,
    /// Templates created without a vector because the backend was down.
    pub embeddings_deferred: usize,
}

/// Outcome of an embedding backfill run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EmbeddingBackfillReport {
    pub scanned: usize,
    pub embedded: usize,
    pub skipped: usize,
}

/// Assign templates to events with a NULL template_id.
///
/// Canonicalizes each orphan at the given ruleset version, resolves or
/// creates its template, embeds newly created templates (tolerating backend
/// failure), links events write-once, and folds counters for the events it
/// linked.
pub async fn backfill_templates(
    store: &Store,
    cache: &TemplateCache,
    embedder: &EmbeddingClient,
    canon_version: &str,
    chunk_version: &str,
    opts: &BackfillOptions,
) -> Result<TemplateBackfillReport> {
    let mut report = TemplateBackfillReport::default();
    let mut cursor = 0i64;

    while (report.scanned as i64) < opts.max_rows {
        let rows = store
            .events_missing_template(cursor, opts.batch_size)
            .await?;
        if rows.is_empty() {
            break;
        }
        cursor = rows.last().map(|event| event.id).unwrap_or(cursor);
        report.scanned += rows.len();

        let keyed = canonicalize_batch(&rows, canon_version);

        // Resolve or create each distinct template in this batch.
        let mut resolved: HashMap<String, i64> = HashMap::new();
        let mut created: Vec<(i64, String)> = Vec::new();
        for (event, canonical, template_hash) in &keyed {
            if resolved.contains_key(template_hash) {
                continue;
            }
            if let Some(id) = cache.get(template_hash) {
                resolved.insert(template_hash.clone(), id);
                continue;
            }
            let new = NewTemplate {
                template_hash: template_hash.clone(),
                canonical_text: canonical.clone(),
                service: event.service.clone(),
                level: event.level,
                canon_version: canon_version.to_string(),
                canon_hash: canon::canon_hash(canonical),
                chunk_version: chunk_version.to_string(),
                first_seen: event.timestamp,
                host: event.host.clone(),
            };
            let (id, was_created) = store.create_template_if_absent(&new).await?;
            cache.put(template_hash, id);
            resolved.insert(template_hash.clone(), id);
            if was_created {
                report.new_templates += 1;
                created.push((id, canonical.clone()));
            }
        }

        // Embed what this batch created; a dead backend just defers.
        if !created.is_empty() {
            let texts: Vec<String> = created.iter().map(|(_, text)| text.clone()).collect();
            match embedder.embed_batch(&texts).await {
                Ok(vectors) => {
                    for ((template_id, _), vector) in created.iter().zip(vectors.iter()) {
                        store
                            .attach_embedding(
                                *template_id,
                                vector,
                                embedder.model(),
                                embedder.dim() as i32,
                            )
                            .await?;
                    }
                }
                Err(e) => {
                    log::warn!("embedding deferred for {} templates: {e}", created.len());
                    report.embeddings_deferred += created.len();
                }
            }
        }

        // Link events write-once and fold counters for the ones we linked.
        let mut counters: HashMap<i64, (i64, chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>, Vec<String>)> =
            HashMap::new();
        for (event, _, template_hash) in &keyed {
            let Some(&template_id) = resolved.get(template_hash) else {
                continue;
            };
            if store.set_event_template(event.id, template_id).await? {
                report.linked += 1;
                let entry = counters.entry(template_id).or_insert((
                    0,
                    event.timestamp,
                    event.timestamp,
                    Vec::new(),
                ));
                entry.0 += 1;
                entry.1 = entry.1.min(event.timestamp);
                entry.2 = entry.2.max(event.timestamp);
                if !entry.3.contains(&event.host) {
                    entry.3.push(event.host.clone());
                }
            }
        }
        for (template_id, (count, first, last, hosts)) in counters {
            store
                .bump_template_counters(template_id, count, first, last, &hosts)
                .await?;
        }

        log::info!(
            "template backfill: scanned={} linked={} new={} (cursor={cursor})",
            report.scanned,
            report.linked,
            report.new_templates
        );
        if !opts.delay.is_zero() {
            tokio::time::sleep(opts.delay).await;
        }
    }

    Ok(report)
}

/// Attach embeddings to templates with a NULL vector; with `stale` set, also
/// re-embed templates from an older pipeline generation (version bump
/// migration).
pub async fn backfill_embeddings(
    store: &Store,
    embedder: &EmbeddingClient,
    canon_version: &str,
    stale: bool,
    opts: &BackfillOptions,
) -> Result<EmbeddingBackfillReport> {
    let mut report = EmbeddingBackfillReport::default();
    let mut cursor = 0i64;

    while (report.scanned as i64) < opts.max_rows {
        let rows = if stale {
            store
                .templates_stale(canon_version, embedder.model(), cursor, opts.batch_size)
                .await?
        } else {
            store
                .templates_missing_embedding(cursor, opts.batch_size)
                .await?
        };
        if rows.is_empty() {
            break;
        }
        cursor = rows.last().map(|template| template.id).unwrap_or(cursor);
        report.scanned += rows.len();

        let texts: Vec<String> = rows
            .iter()
            .map(|template| template.canonical_text.clone())
            .collect();
        match embedder.embed_batch(&texts).await {
            Ok(vectors) => {
                for (template, vector) in rows.iter().zip(vectors.iter()) {
                    if stale && template.embedding.is_some() {
                        store
                            .migrate_embedding(
                                template.id,
                                vector,
                                embedder.model(),
                                embedder.dim() as i32,
                            )
                            .await?;
                    } else {
                        store
                            .attach_embedding(
                                template.id,
                                vector,
                                embedder.model(),
                                embedder.dim() as i32,
                            )
                            .await?;
                    }
                    report.embedded += 1;
                }
            }
            Err(e) => {
                // Skip and move on; the next run picks these up again.
                log::warn!("embedding batch failed at cursor {cursor}: {e}");
                report.skipped += rows.len();
            }
        }

        log::info!(
            "embedding backfill: scanned={} embedded={} skipped={} (cursor={cursor})",
            report.scanned,
            report.embedded,
            report.skipped
        );
        if !opts.delay.is_zero() {
            tokio::time::sleep(opts.delay).await;
        }
        embedder.batch_delay().await;
    }

    Ok(report)
}

fn canonicalize_batch<'a>(rows: &'a [LogEvent], version: &str) -> Vec<(&'a LogEvent, String, String)> {
    let mut keyed = Vec::with_capacity(rows.len());
    for event in rows {
        match canon::template_key(&event.message, &event.service, event.level, version) {
            Ok((canonical, template_hash)) => keyed.push((event, canonical, template_hash)),
            Err(e) => {
                log::warn!("skipping event {}: {e}", event.id);
            }
        }
    }
    keyed
}
