//! Embedding client for the LLM gateway.
//!
//! Talks to an OpenAI-compatible batch endpoint (/v1/embeddings); the
//! single-text endpoint (/api/embeddings) is roughly 30x slower and used only
//! as a fallback. Failures are retried with backoff; on final failure the
//! client reports embedding-unavailable and callers decide how to degrade
//! (live ingest leaves templates unembedded, backfill skips and moves on).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::config::EmbeddingConfig;
use crate::error::Result;
use crate::Error;

/// Client for the embedding backend. One instance is shared process-wide;
/// the semaphore caps concurrent requests so the backend is not overrun.
pub struct EmbeddingClient {
    http: reqwest::Client,
    config: EmbeddingConfig,
    permits: Semaphore,
}

#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    data: Vec<BatchItem>,
}

#[derive(Debug, Deserialize)]
struct BatchItem {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct SingleRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct SingleResponse {
    embedding: Vec<f32>,
}

impl EmbeddingClient {
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;
        let permits = Semaphore::new(config.max_concurrency.max(1));
        Ok(Self {
            http,
            config,
            permits,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn dim(&self) -> usize {
        self.config.dim as usize
    }

    pub fn batch_size(&self) -> usize {
        self.config.batch_size.max(1)
    }

    /// Sleep the configured inter-batch delay (thermal knob). No-op at zero.
    pub async fn batch_delay(&self) {
        if self.config.batch_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.batch_delay_ms)).await;
        }
    }

    /// Embed a batch of texts. The returned list is 1:1 with the input.
    ///
    /// Tries the batch endpoint with bounded retries, then falls back to
    /// sequential single-text calls. Returns EmbeddingUnavailable when both
    /// paths are exhausted.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| Error::EmbeddingUnavailable("client shut down".to_string()))?;

        let mut last_error = String::new();
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff(attempt)).await;
            }
            match self.post_batch(texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(Error::DimensionMismatch { expected, got }) => {
                    // A malformed backend will not fix itself on retry.
                    return Err(Error::DimensionMismatch { expected, got });
                }
                Err(e) => {
                    last_error = e.to_string();
                    log::warn!(
                        "batch embedding attempt {}/{} failed: {last_error}",
                        attempt + 1,
                        self.config.max_retries + 1
                    );
                }
            }
        }

        log::warn!("batch endpoint exhausted, falling back to single-text calls");
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            match self.post_single(text).await {
                Ok(vector) => vectors.push(vector),
                Err(e) => {
                    return Err(Error::EmbeddingUnavailable(format!(
                        "batch failed ({last_error}); single-text fallback failed: {e}"
                    )));
                }
            }
        }
        Ok(vectors)
    }

    /// Embed a single text (query embedding for search).
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let texts = [text.to_string()];
        let vectors = self.embed_batch(&texts).await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| Error::EmbeddingUnavailable("empty response".to_string()))
    }

    async fn post_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/v1/embeddings", self.config.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .json(&BatchRequest {
                model: &self.config.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| Error::EmbeddingUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::EmbeddingUnavailable(format!("HTTP {status} from {url}")));
        }

        let body: BatchResponse = response
            .json()
            .await
            .map_err(|e| Error::EmbeddingUnavailable(format!("malformed response: {e}")))?;
        collect_batch(body, texts.len(), self.dim())
    }

    async fn post_single(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.config.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .json(&SingleRequest {
                model: &self.config.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| Error::EmbeddingUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::EmbeddingUnavailable(format!("HTTP {status} from {url}")));
        }

        let body: SingleResponse = response
            .json()
            .await
            .map_err(|e| Error::EmbeddingUnavailable(format!("malformed response: {e}")))?;
        check_dim(&body.embedding, self.dim())?;
        Ok(body.embedding)
    }
}

// The backend is free to return items out of order; the index field is the
// contract for 1:1 alignment with the input.
fn collect_batch(mut body: BatchResponse, expected_len: usize, dim: usize) -> Result<Vec<Vec<f32>>> {
    if body.data.len() != expected_len {
        return Err(Error::EmbeddingUnavailable(format!(
            "expected {expected_len} embeddings, got {}",
            body.data.len()
        )));
    }
    body.data.sort_by_key(|item| item.index);
    let mut vectors = Vec::with_capacity(body.data.len());
    for (position, item) in body.data.into_iter().enumerate() {
        if item.index != position {
            return Err(Error::EmbeddingUnavailable(format!(
                "missing embedding for input index {position}"
            )));
        }
        check_dim(&item.embedding, dim)?;
        vectors.push(item.embedding);
    }
    Ok(vectors)
}

fn check_dim(vector: &[f32], dim: usize) -> Result<()> {
    if vector.len() != dim {
        return Err(Error::DimensionMismatch {
            expected: dim,
            got: vector.len(),
        });
    }
    Ok(())
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(500u64.saturating_mul(1 << attempt.min(6)))
}

#[cfg(test)]
#[path = "embed_tests.rs"]
mod tests;
