//! Search layer: two-step semantic retrieval over templates, legacy
//! event-vector search, and plain relational queries.

use std::sync::Arc;

use serde::Serialize;

use crate::db::{EventFilter, SearchFilter, Store};
use crate::embed::EmbeddingClient;
use crate::error::Result;
use crate::models::{LogEvent, Template};
use crate::Error;

/// Default and maximum result bounds.
pub const DEFAULT_TEMPLATE_LIMIT: i64 = 20;
pub const MAX_TEMPLATE_LIMIT: i64 = 100;
pub const DEFAULT_EXAMPLES: i64 = 3;
pub const MAX_EXAMPLES: i64 = 20;
pub const DEFAULT_EVENT_LIMIT: i64 = 50;
pub const MAX_EVENT_LIMIT: i64 = 500;

/// One ranked template with representative events.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateHit {
    pub template: Template,
    /// Cosine distance to the query (lower is closer).
    pub distance: f64,
    pub examples: Vec<LogEvent>,
}

/// Result of a two-step template search.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateSearchResult {
    pub hits: Vec<TemplateHit>,
    /// True when the embedding backend was unreachable and no vector search
    /// could run.
    pub degraded: bool,
}

/// One ranked raw event (legacy search surface).
#[derive(Debug, Clone, Serialize)]
pub struct EventHit {
    pub event: LogEvent,
    pub distance: f64,
}

/// Result of a legacy event-level search.
#[derive(Debug, Clone, Serialize)]
pub struct EventSearchResult {
    pub hits: Vec<EventHit>,
    pub degraded: bool,
}

/// Read-side facade over the store and the embedding client.
pub struct SearchLayer {
    store: Arc<Store>,
    embedder: Arc<EmbeddingClient>,
}

impl SearchLayer {
    pub fn new(store: Arc<Store>, embedder: Arc<EmbeddingClient>) -> Self {
        Self { store, embedder }
    }

    /// Two-step semantic search: embed the query, rank templates by cosine
    /// distance, then sample representative events per template.
    pub async fn search_templates(
        &self,
        query: &str,
        limit: i64,
        examples: i64,
        filter: &SearchFilter,
    ) -> Result<TemplateSearchResult> {
        let limit = limit.clamp(1, MAX_TEMPLATE_LIMIT);
        let examples = examples.clamp(0, MAX_EXAMPLES);

        let query_vector = match self.embedder.embed_one(query).await {
            Ok(vector) => vector,
            Err(e) if is_degraded(&e) => {
                log::warn!("template search degraded: {e}");
                return Ok(TemplateSearchResult {
                    hits: Vec::new(),
                    degraded: true,
                });
            }
            Err(e) => return Err(e),
        };

        let ranked = self
            .store
            .vector_search_templates(&query_vector, limit, filter)
            .await?;
        let ids: Vec<i64> = ranked.iter().map(|(template, _)| template.id).collect();
        let mut samples = if examples > 0 {
            self.store
                .sample_events_by_template(&ids, examples, filter.start, filter.end)
                .await?
        } else {
            Default::default()
        };

        let hits = ranked
            .into_iter()
            .map(|(mut template, distance)| {
                // Don't ship the raw vector back to clients.
                template.embedding = None;
                let examples = samples.remove(&template.id).unwrap_or_default();
                TemplateHit {
                    template,
                    distance,
                    examples,
                }
            })
            .collect();

        Ok(TemplateSearchResult {
            hits,
            degraded: false,
        })
    }

    /// Legacy direct search over event embeddings. Retained for rows written
    /// before template-level search became the primary surface.
    pub async fn search_events(
        &self,
        query: &str,
        limit: i64,
        filter: &SearchFilter,
    ) -> Result<EventSearchResult> {
        let limit = limit.clamp(1, MAX_EVENT_LIMIT);

        let query_vector = match self.embedder.embed_one(query).await {
            Ok(vector) => vector,
            Err(e) if is_degraded(&e) => {
                log::warn!("event search degraded: {e}");
                return Ok(EventSearchResult {
                    hits: Vec::new(),
                    degraded: true,
                });
            }
            Err(e) => return Err(e),
        };

        let ranked = self
            .store
            .search_events_by_vector(&query_vector, limit, filter)
            .await?;
        let hits = ranked
            .into_iter()
            .map(|(event, distance)| EventHit { event, distance })
            .collect();

        Ok(EventSearchResult {
            hits,
            degraded: false,
        })
    }

    /// Plain relational query, bypassing the vector path entirely.
    pub async fn query_logs(&self, filter: &EventFilter) -> Result<Vec<LogEvent>> {
        self.store.query_events(filter).await
    }
}

fn is_degraded(error: &Error) -> bool {
    matches!(
        error,
        Error::EmbeddingUnavailable(_) | Error::DimensionMismatch { .. }
    )
}
