//! Embedding provider trait and the OpenAI-backed implementation.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::RagConfig;
use crate::error::{RagError, Result};

/// The default OpenAI embeddings API endpoint.
const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

/// The default model for OpenAI embeddings.
const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// The default dimensionality for `text-embedding-3-small`.
const DEFAULT_DIMENSIONS: usize = 1536;

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap a remote embedding backend behind a unified
/// async interface. [`embed_batch`](EmbeddingProvider::embed_batch) is
/// the primary entry point: every call is a billed network round-trip,
/// so callers must batch rather than loop over single texts.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding vectors for a batch of text inputs, one vector
    /// per input, order preserved.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Generate an embedding vector for a single text (a 1-element batch).
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text]).await?;
        results.into_iter().next().ok_or_else(|| RagError::Provider {
            provider: "embedding".into(),
            message: "provider returned no vectors for a non-empty batch".into(),
        })
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;
}

/// Collapse newlines to spaces and trim, the normalization applied to
/// every text before submission to the embedding endpoint.
fn normalize(text: &str) -> String {
    text.replace('\n', " ").trim().to_string()
}

/// An [`EmbeddingProvider`] backed by the OpenAI embeddings API.
///
/// Inputs are newline-collapsed and trimmed, then submitted in bounded
/// batches with a configurable pause between batches to stay under
/// provider rate limits.
///
/// # Example
///
/// ```rust,ignore
/// use dreamlens_rag::embedding::OpenAiEmbedder;
///
/// let embedder = OpenAiEmbedder::from_env()?.with_batch_size(100);
/// let vectors = embedder.embed_batch(&["뱀에게 물렸다"]).await?;
/// ```
#[derive(Debug)]
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimensions: usize,
    batch_size: usize,
    batch_pause: Duration,
}

impl OpenAiEmbedder {
    /// Create a new embedder with the given API key.
    ///
    /// Uses the default model (`text-embedding-3-small`, 1536 dims), a
    /// batch size of 100, a 1 s inter-batch pause, and a 30 s request
    /// timeout.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_timeout(api_key, Duration::from_secs(30))
    }

    /// Create a new embedder with an explicit per-request timeout.
    /// Timeout expiry surfaces as [`RagError::Provider`].
    pub fn with_timeout(api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::Provider {
                provider: "OpenAI".into(),
                message: "API key must not be empty".into(),
            });
        }

        let client = reqwest::Client::builder().timeout(timeout).build().map_err(|e| {
            RagError::Provider {
                provider: "OpenAI".into(),
                message: format!("failed to build HTTP client: {e}"),
            }
        })?;

        Ok(Self {
            client,
            api_key,
            model: DEFAULT_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
            batch_size: 100,
            batch_pause: Duration::from_secs(1),
        })
    }

    /// Create an embedder governed by a [`RagConfig`]: its
    /// `embed_batch_size`, `batch_pause_ms`, and `request_timeout_secs`
    /// replace the constructor defaults.
    pub fn from_config(api_key: impl Into<String>, config: &RagConfig) -> Result<Self> {
        Ok(Self::with_timeout(api_key, config.request_timeout())?
            .with_batch_size(config.embed_batch_size)
            .with_batch_pause(config.batch_pause()))
    }

    /// Create a new embedder using the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| RagError::Provider {
            provider: "OpenAI".into(),
            message: "OPENAI_API_KEY environment variable not set".into(),
        })?;
        Self::new(api_key)
    }

    /// Set the model name and its output dimensionality.
    pub fn with_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
        self.model = model.into();
        self.dimensions = dimensions;
        self
    }

    /// Set the maximum number of texts submitted per request.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the pause inserted between consecutive batches.
    pub fn with_batch_pause(mut self, pause: Duration) -> Self {
        self.batch_pause = pause;
        self
    }

    /// The maximum number of texts submitted per request.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// The pause inserted between consecutive batches.
    pub fn batch_pause(&self) -> Duration {
        self.batch_pause
    }

    /// Submit one bounded batch to the embeddings endpoint.
    async fn embed_one_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let request_body = EmbeddingRequest {
            model: &self.model,
            input: batch.iter().map(String::as_str).collect(),
        };

        let response = self
            .client
            .post(OPENAI_EMBEDDINGS_URL)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = "OpenAI", error = %e, "embedding request failed");
                RagError::Provider {
                    provider: "OpenAI".into(),
                    message: format!("request failed: {e}"),
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);

            error!(provider = "OpenAI", %status, "embeddings API error");
            return Err(RagError::Provider {
                provider: "OpenAI".into(),
                message: format!("API returned {status}: {detail}"),
            });
        }

        let embedding_response: EmbeddingResponse = response.json().await.map_err(|e| {
            error!(provider = "OpenAI", error = %e, "failed to parse embeddings response");
            RagError::Provider {
                provider: "OpenAI".into(),
                message: format!("failed to parse response: {e}"),
            }
        })?;

        if embedding_response.data.len() != batch.len() {
            return Err(RagError::Provider {
                provider: "OpenAI".into(),
                message: format!(
                    "API returned {} vectors for {} inputs",
                    embedding_response.data.len(),
                    batch.len()
                ),
            });
        }

        Ok(embedding_response.data.into_iter().map(|d| d.embedding).collect())
    }
}

// ── OpenAI API request/response types ──────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

// ── EmbeddingProvider implementation ───────────────────────────────

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut cleaned = Vec::with_capacity(texts.len());
        for text in texts {
            let normalized = normalize(text);
            if normalized.is_empty() {
                return Err(RagError::InvalidInput(
                    "embedding input must not be empty after trimming".to_string(),
                ));
            }
            cleaned.push(normalized);
        }

        debug!(
            provider = "OpenAI",
            total = cleaned.len(),
            batch_size = self.batch_size,
            model = %self.model,
            "embedding texts"
        );

        let mut vectors = Vec::with_capacity(cleaned.len());
        let batch_count = cleaned.len().div_ceil(self.batch_size);
        for (i, batch) in cleaned.chunks(self.batch_size).enumerate() {
            debug!(provider = "OpenAI", batch = i + 1, of = batch_count, items = batch.len(), "embedding batch");
            vectors.extend(self.embed_one_batch(batch).await?);
            if i + 1 < batch_count && !self.batch_pause.is_zero() {
                tokio::time::sleep(self.batch_pause).await;
            }
        }

        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_newlines_and_trims() {
        assert_eq!(normalize("  뱀이\n나오는 꿈  "), "뱀이 나오는 꿈");
    }

    #[test]
    fn empty_api_key_rejected() {
        let err = OpenAiEmbedder::new("").unwrap_err();
        assert!(matches!(err, RagError::Provider { .. }));
    }

    #[test]
    fn from_config_applies_provider_knobs() {
        let config = RagConfig::builder()
            .embed_batch_size(250)
            .batch_pause_ms(0)
            .request_timeout_secs(60)
            .build()
            .unwrap();
        let embedder = OpenAiEmbedder::from_config("sk-test", &config).unwrap();
        assert_eq!(embedder.batch_size(), 250);
        assert!(embedder.batch_pause().is_zero());
    }

    #[tokio::test]
    async fn empty_input_text_rejected() {
        let embedder = OpenAiEmbedder::new("sk-test").unwrap();
        let err = embedder.embed_batch(&["   \n  "]).await.unwrap_err();
        assert!(matches!(err, RagError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let embedder = OpenAiEmbedder::new("sk-test").unwrap();
        let vectors = embedder.embed_batch(&[]).await.unwrap();
        assert!(vectors.is_empty());
    }
}
