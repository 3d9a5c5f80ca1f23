//! The central write path: validate, hash, dedup, canonicalize, resolve
//! templates, embed, persist.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Semaphore;

use crate::cache::TemplateCache;
use crate::canon;
use crate::config::IngestConfig;
use crate::db::{EventInsert, Store};
use crate::embed::EmbeddingClient;
use crate::error::Result;
use crate::models::*;
use crate::Error;

/// Ingest pipeline shared by all HTTP workers.
pub struct IngestPipeline {
    store: Arc<Store>,
    cache: Arc<TemplateCache>,
    embedder: Arc<EmbeddingClient>,
    config: IngestConfig,
    canon_version: String,
    chunk_version: String,
    // Bounded admission: when all permits are out the endpoint reports busy
    // and the shipper retries from its cursor.
    inflight: Semaphore,
}

// One event that survived validation and dedup, still in submission order.
struct Survivor {
    event: NewLogEvent,
    log_hash: String,
    template_hash: String,
}

impl IngestPipeline {
    pub fn new(
        store: Arc<Store>,
        cache: Arc<TemplateCache>,
        embedder: Arc<EmbeddingClient>,
        config: IngestConfig,
        canon_version: String,
        chunk_version: String,
    ) -> Self {
        let inflight = Semaphore::new(config.max_inflight_batches.max(1));
        Self {
            store,
            cache,
            embedder,
            config,
            canon_version,
            chunk_version,
            inflight,
        }
    }

    /// Process one shipper submission.
    ///
    /// Duplicates are dropped silently and counted; per-record validation and
    /// canonicalization failures are reported without failing the batch; a
    /// durable-store failure fails the whole batch so the shipper retries.
    pub async fn ingest(&self, batch: Vec<NewLogEvent>) -> Result<IngestReport> {
        let mut report = IngestReport::default();
        if batch.is_empty() {
            return Ok(report);
        }
        if batch.len() > self.config.max_batch_len {
            return Err(Error::Validation(format!(
                "batch of {} exceeds limit of {}",
                batch.len(),
                self.config.max_batch_len
            )));
        }

        let _permit = self.inflight.try_acquire().map_err(|_| Error::Busy)?;

        let now = Utc::now();
        let skew = Duration::seconds(self.config.skew_tolerance_secs);

        // Steps 1-2: hash, then drop everything the store (or this very
        // batch) has already seen.
        let mut survivors = Vec::with_capacity(batch.len());
        let mut seen_in_batch = HashSet::new();
        let mut hashes = Vec::new();

        for (index, event) in batch.into_iter().enumerate() {
            if let Err(reason) = validate_event(&event, now, skew) {
                report.failed += 1;
                report.errors.push(IngestError { index, reason });
                continue;
            }
            let log_hash =
                canon::log_hash(&event.timestamp, &event.host, &event.service, &event.message);
            if !seen_in_batch.insert(log_hash.clone()) {
                report.duplicates += 1;
                continue;
            }
            hashes.push(log_hash.clone());
            survivors.push((index, event, log_hash));
        }

        let existing = self.store.existing_log_hashes(&hashes).await?;
        report.duplicates += survivors
            .iter()
            .filter(|(_, _, hash)| existing.contains(hash))
            .count();
        let survivors: Vec<(usize, NewLogEvent, String)> = survivors
            .into_iter()
            .filter(|(_, _, hash)| !existing.contains(hash))
            .collect();

        // Step 3: canonicalize at the current ruleset version.
        let mut keyed = Vec::with_capacity(survivors.len());
        let mut canonical_by_hash: HashMap<String, String> = HashMap::new();
        for (index, event, log_hash) in survivors {
            match canon::template_key(&event.message, &event.service, event.level, &self.canon_version)
            {
                Ok((canonical, template_hash)) => {
                    canonical_by_hash
                        .entry(template_hash.clone())
                        .or_insert(canonical);
                    keyed.push(Survivor {
                        event,
                        log_hash,
                        template_hash,
                    });
                }
                Err(e) => {
                    report.failed += 1;
                    report.errors.push(IngestError {
                        index,
                        reason: format!("canonicalization failed: {e}"),
                    });
                }
            }
        }

        // Step 4: resolve or create templates, grouped by fingerprint.
        let mut resolved: HashMap<String, Option<i64>> = HashMap::new();
        let mut pending_embed: Vec<(i64, String)> = Vec::new();

        for survivor in &keyed {
            if resolved.contains_key(&survivor.template_hash) {
                continue;
            }
            let canonical = &canonical_by_hash[&survivor.template_hash];
            let template_id = self
                .resolve_template(survivor, canonical, &mut pending_embed)
                .await;
            resolved.insert(survivor.template_hash.clone(), template_id);
        }

        // Step 5: embed newly created templates. The backend being down is a
        // soft failure; the safety net completes these later.
        if !pending_embed.is_empty() {
            match self.embed_pending(&pending_embed).await {
                Ok(()) => {}
                Err(Error::Database(e)) => return Err(Error::Database(e)),
                Err(e) => {
                    log::warn!(
                        "leaving {} templates unembedded: {e}",
                        pending_embed.len()
                    );
                    report.embeddings_deferred = pending_embed.len();
                }
            }
        }

        // Step 6: persist events with their template assignment.
        let inserts: Vec<EventInsert> = keyed
            .iter()
            .map(|survivor| EventInsert {
                event: survivor.event.clone(),
                log_hash: survivor.log_hash.clone(),
                template_id: resolved
                    .get(&survivor.template_hash)
                    .copied()
                    .flatten(),
            })
            .collect();
        let ids = self.store.insert_events(&inserts).await?;

        // Step 7: fold accepted events into their template counters.
        let mut counters: HashMap<i64, CounterFold> = HashMap::new();
        for (survivor, id) in keyed.iter().zip(ids.iter()) {
            if id.is_none() {
                // Lost a cross-batch race between the dedup probe and the
                // insert; same outcome as a duplicate submission.
                report.duplicates += 1;
                continue;
            }
            report.accepted += 1;
            if let Some(template_id) = resolved.get(&survivor.template_hash).copied().flatten() {
                counters
                    .entry(template_id)
                    .or_insert_with(|| CounterFold::new(survivor.event.timestamp))
                    .fold(&survivor.event);
            }
        }
        for (template_id, fold) in counters {
            let hosts: Vec<String> = fold.hosts.into_iter().collect();
            self.store
                .bump_template_counters(template_id, fold.count, fold.first, fold.last, &hosts)
                .await?;
        }

        Ok(report)
    }

    // Cache, then durable lookup, then insert-or-fetch. Creation failure is
    // tolerated: the event lands with template_id NULL and the safety net
    // assigns it later.
    async fn resolve_template(
        &self,
        survivor: &Survivor,
        canonical: &str,
        pending_embed: &mut Vec<(i64, String)>,
    ) -> Option<i64> {
        if let Some(id) = self.cache.get(&survivor.template_hash) {
            return Some(id);
        }
        match self.store.lookup_template(&survivor.template_hash).await {
            Ok(Some(id)) => {
                self.cache.put(&survivor.template_hash, id);
                return Some(id);
            }
            Ok(None) => {}
            Err(e) => {
                log::warn!("template lookup failed for {}: {e}", survivor.template_hash);
                return None;
            }
        }

        let new = NewTemplate {
            template_hash: survivor.template_hash.clone(),
            canonical_text: canonical.to_string(),
            service: survivor.event.service.clone(),
            level: survivor.event.level,
            canon_version: self.canon_version.clone(),
            canon_hash: canon::canon_hash(canonical),
            chunk_version: self.chunk_version.clone(),
            first_seen: survivor.event.timestamp,
            host: survivor.event.host.clone(),
        };
        match self.store.create_template_if_absent(&new).await {
            Ok((id, created)) => {
                self.cache.put(&survivor.template_hash, id);
                if created {
                    pending_embed.push((id, canonical.to_string()));
                }
                Some(id)
            }
            Err(e) => {
                log::warn!(
                    "template create failed for {}: {e}",
                    survivor.template_hash
                );
                None
            }
        }
    }

    async fn embed_pending(&self, pending: &[(i64, String)]) -> Result<()> {
        let mut first = true;
        for chunk in pending.chunks(self.embedder.batch_size()) {
            if !first {
                self.embedder.batch_delay().await;
            }
            first = false;

            let texts: Vec<String> = chunk.iter().map(|(_, text)| text.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;
            for ((template_id, _), vector) in chunk.iter().zip(vectors.iter()) {
                self.store
                    .attach_embedding(
                        *template_id,
                        vector,
                        self.embedder.model(),
                        self.embedder.dim() as i32,
                    )
                    .await?;
            }
        }
        Ok(())
    }
}

struct CounterFold {
    count: i64,
    first: DateTime<Utc>,
    last: DateTime<Utc>,
    hosts: BTreeSet<String>,
}

impl CounterFold {
    fn new(ts: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            first: ts,
            last: ts,
            hosts: BTreeSet::new(),
        }
    }

    fn fold(&mut self, event: &NewLogEvent) {
        self.count += 1;
        self.first = self.first.min(event.timestamp);
        self.last = self.last.max(event.timestamp);
        self.hosts.insert(event.host.clone());
    }
}

fn validate_event(
    event: &NewLogEvent,
    now: DateTime<Utc>,
    skew: Duration,
) -> std::result::Result<(), String> {
    check_identifier("source", &event.source, 255)?;
    check_identifier("service", &event.service, 255)?;
    check_identifier("host", &event.host, 255)?;
    check_optional("trace_id", event.trace_id.as_deref(), 64)?;
    check_optional("span_id", event.span_id.as_deref(), 32)?;
    check_optional("event_type", event.event_type.as_deref(), 100)?;
    check_optional("error_code", event.error_code.as_deref(), 50)?;

    if event.timestamp > now + skew {
        return Err(format!(
            "timestamp {} is beyond the skew tolerance",
            event.timestamp.to_rfc3339()
        ));
    }
    Ok(())
}

fn check_identifier(field: &str, value: &str, max: usize) -> std::result::Result<(), String> {
    if value.is_empty() {
        return Err(format!("{field} must not be empty"));
    }
    check_optional(field, Some(value), max)
}

fn check_optional(
    field: &str,
    value: Option<&str>,
    max: usize,
) -> std::result::Result<(), String> {
    match value {
        Some(v) if v.len() > max => Err(format!("{field} exceeds {max} bytes")),
        _ => Ok(()),
    }
}

#[cfg(test)]
#[path = "ingest_tests.rs"]
mod tests;
