//! Configuration for the dream interpretation pipeline.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Configuration parameters for the pipeline.
///
/// Construct via [`RagConfig::builder()`]; the builder validates
/// parameter consistency. The provider-facing knobs
/// (`embed_batch_size`, `batch_pause_ms`, `request_timeout_secs`) take
/// effect through the providers' `from_config` constructors
/// ([`OpenAiEmbedder::from_config`](crate::embedding::OpenAiEmbedder::from_config),
/// [`OpenAiChatModel::from_config`](crate::generation::OpenAiChatModel::from_config));
/// a provider built another way keeps its own settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Number of nearest records retrieved per query.
    pub top_k: usize,
    /// Maximum number of texts per embedding request.
    pub embed_batch_size: usize,
    /// Pause between consecutive embedding batches, in milliseconds.
    ///
    /// A blunt rate-limit avoidance measure inherited from the corpus
    /// build; set to 0 to disable.
    pub batch_pause_ms: u64,
    /// Timeout applied to each remote provider call, in seconds.
    /// Expiry surfaces as [`RagError::Provider`].
    pub request_timeout_secs: u64,
    /// Sampling temperature for chat completion.
    pub temperature: f32,
    /// Location of the persisted vector index blob.
    pub index_path: PathBuf,
    /// Location of the persisted metadata array.
    pub metadata_path: PathBuf,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            embed_batch_size: 100,
            batch_pause_ms: 1000,
            request_timeout_secs: 30,
            temperature: 0.7,
            index_path: PathBuf::from("vector_db/dream.index"),
            metadata_path: PathBuf::from("vector_db/dream_meta.json"),
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// The inter-batch pause as a [`Duration`].
    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    /// The per-request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the number of nearest records retrieved per query.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the maximum number of texts per embedding request.
    pub fn embed_batch_size(mut self, size: usize) -> Self {
        self.config.embed_batch_size = size;
        self
    }

    /// Set the pause between embedding batches, in milliseconds.
    pub fn batch_pause_ms(mut self, ms: u64) -> Self {
        self.config.batch_pause_ms = ms;
        self
    }

    /// Set the per-request provider timeout, in seconds.
    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    /// Set the chat completion sampling temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = temperature;
        self
    }

    /// Set the persisted index location.
    pub fn index_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.index_path = path.into();
        self
    }

    /// Set the persisted metadata location.
    pub fn metadata_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.metadata_path = path.into();
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if:
    /// - `top_k == 0`
    /// - `embed_batch_size` is 0 or greater than 2048
    /// - `request_timeout_secs == 0`
    /// - `temperature` is not within `0.0..=2.0`
    pub fn build(self) -> Result<RagConfig> {
        if self.config.top_k == 0 {
            return Err(RagError::Config("top_k must be greater than zero".to_string()));
        }
        if self.config.embed_batch_size == 0 || self.config.embed_batch_size > 2048 {
            return Err(RagError::Config(format!(
                "embed_batch_size ({}) must be within 1..=2048",
                self.config.embed_batch_size
            )));
        }
        if self.config.request_timeout_secs == 0 {
            return Err(RagError::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.config.temperature) {
            return Err(RagError::Config(format!(
                "temperature ({}) must be within 0.0..=2.0",
                self.config.temperature
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RagConfig::builder().build().unwrap();
        assert_eq!(config, RagConfig::default());
    }

    #[test]
    fn zero_top_k_rejected() {
        let err = RagConfig::builder().top_k(0).build().unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }

    #[test]
    fn oversized_batch_rejected() {
        let err = RagConfig::builder().embed_batch_size(4096).build().unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }

    #[test]
    fn out_of_range_temperature_rejected() {
        let err = RagConfig::builder().temperature(3.5).build().unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }
}
