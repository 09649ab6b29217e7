//! The dream interpretation pipeline: lifecycle, retrieval, and
//! grounded generation behind one process-wide handle.
//!
//! The handle owns an immutable [`CorpusSnapshot`] behind an
//! `RwLock<Option<Arc<…>>>`: query serving clones the `Arc` and reads
//! without further locking, while a rebuild constructs the replacement
//! snapshot entirely off to the side and swaps it in atomically. A live
//! snapshot is never mutated.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use dreamlens_rag::{DreamLensPipeline, RagConfig};
//! use dreamlens_rag::embedding::OpenAiEmbedder;
//! use dreamlens_rag::generation::OpenAiChatModel;
//!
//! let api_key = std::env::var("OPENAI_API_KEY").expect("OPENAI_API_KEY not set");
//! let config = RagConfig::default();
//! let pipeline = DreamLensPipeline::builder()
//!     .embedder(Arc::new(OpenAiEmbedder::from_config(&api_key, &config)?))
//!     .chat(Arc::new(OpenAiChatModel::from_config(&api_key, &config)?))
//!     .config(config)
//!     .build()?;
//!
//! pipeline.ingest_if_absent("data/dream.json".as_ref()).await?;
//! let reading = pipeline.interpret("뱀에게 물리는 꿈을 꿨어요").await?;
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::RagConfig;
use crate::corpus::{self, CorpusSnapshot};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::ChatProvider;
use crate::prompt;
use crate::record::{DreamReading, RetrievedDream, TaxonomyCatalog};
use crate::retriever::Retriever;

/// Process-wide handle over the corpus and the remote providers.
///
/// Construct via [`DreamLensPipeline::builder()`], then load a corpus
/// with [`ingest_if_absent`](DreamLensPipeline::ingest_if_absent) or
/// [`load_existing`](DreamLensPipeline::load_existing) before serving.
pub struct DreamLensPipeline {
    config: RagConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    chat: Arc<dyn ChatProvider>,
    snapshot: RwLock<Option<Arc<CorpusSnapshot>>>,
    // Request-boundary memoization; cost optimization only, dropped
    // wholesale whenever the snapshot is replaced.
    reading_cache: RwLock<HashMap<String, DreamReading>>,
    combine_cache: RwLock<HashMap<Vec<String>, DreamReading>>,
}

impl DreamLensPipeline {
    /// Create a new [`DreamLensPipelineBuilder`].
    pub fn builder() -> DreamLensPipelineBuilder {
        DreamLensPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Load the persisted index/metadata pair and start serving from it.
    ///
    /// # Errors
    ///
    /// [`RagError::IndexUnavailable`] if either artifact is missing,
    /// unreadable, or misaligned.
    pub async fn load_existing(&self) -> Result<()> {
        let snapshot = corpus::load_corpus(&self.config).await?;
        self.install(snapshot).await;
        Ok(())
    }

    /// Load the persisted pair if both artifacts exist, otherwise build
    /// from the corpus file, persist, and serve the fresh build.
    ///
    /// The embed-and-write step runs at most once per target location:
    /// a second call with the artifacts still in place only loads them.
    pub async fn ingest_if_absent(&self, corpus_path: &Path) -> Result<()> {
        if corpus::artifacts_exist(&self.config) {
            info!(
                index = %self.config.index_path.display(),
                "persisted corpus artifacts found, skipping rebuild"
            );
            return self.load_existing().await;
        }
        self.rebuild(corpus_path).await
    }

    /// Build a fresh snapshot from the corpus file, persist it, and
    /// atomically swap it in. Query caches are invalidated.
    ///
    /// Serving continues from the previous snapshot until the swap; the
    /// build never touches the in-service index.
    pub async fn rebuild(&self, corpus_path: &Path) -> Result<()> {
        let snapshot = corpus::build_corpus(corpus_path, &self.embedder).await?;
        corpus::persist_snapshot(&snapshot, &self.config).await?;
        self.install(snapshot).await;
        Ok(())
    }

    /// Publish a snapshot and drop all cached readings.
    async fn install(&self, snapshot: CorpusSnapshot) {
        let snapshot = Arc::new(snapshot);
        *self.snapshot.write().await = Some(snapshot);
        self.reading_cache.write().await.clear();
        self.combine_cache.write().await.clear();
    }

    /// The current snapshot, or [`RagError::IndexUnavailable`] if no
    /// corpus has been loaded yet.
    async fn snapshot(&self) -> Result<Arc<CorpusSnapshot>> {
        self.snapshot.read().await.clone().ok_or_else(|| {
            RagError::IndexUnavailable(
                "no corpus loaded; call ingest_if_absent or load_existing first".to_string(),
            )
        })
    }

    /// The classification taxonomy of the currently served corpus.
    pub async fn taxonomy(&self) -> Result<TaxonomyCatalog> {
        Ok(self.snapshot().await?.taxonomy.clone())
    }

    /// Number of records in the currently served corpus.
    pub async fn corpus_size(&self) -> Result<usize> {
        Ok(self.snapshot().await?.records.len())
    }

    /// Retrieve the configured top-k records nearest to `query`,
    /// ascending distance.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedDream>> {
        let snapshot = self.snapshot().await?;
        let retriever = Retriever::new(&snapshot, Arc::clone(&self.embedder));
        retriever.retrieve(query, self.config.top_k).await
    }

    /// Retrieve by 1–3 keywords joined into one query string.
    pub async fn retrieve_by_keywords(&self, keywords: &[&str]) -> Result<Vec<RetrievedDream>> {
        let snapshot = self.snapshot().await?;
        let retriever = Retriever::new(&snapshot, Arc::clone(&self.embedder));
        retriever.retrieve_by_keywords(keywords, self.config.top_k).await
    }

    /// Produce a full four-section reading for a user's dream:
    /// retrieve, assemble the grounded prompt with the corpus taxonomy,
    /// call the chat model, and parse the delimited response.
    ///
    /// A malformed model response degrades to the deterministic
    /// fallback reading (`from_fallback == true`); only provider,
    /// index-availability, and input errors are surfaced.
    pub async fn interpret(&self, query: &str) -> Result<DreamReading> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RagError::InvalidInput("dream text must not be empty".to_string()));
        }

        if let Some(cached) = self.reading_cache.read().await.get(query) {
            debug!(query_len = query.len(), "serving cached reading");
            return Ok(cached.clone());
        }

        let snapshot = self.snapshot().await?;
        let retriever = Retriever::new(&snapshot, Arc::clone(&self.embedder));
        let retrieved = retriever.retrieve(query, self.config.top_k).await?;

        let user_prompt = prompt::build_reading_prompt(query, &retrieved, Some(&snapshot.taxonomy));
        let raw = self
            .chat
            .complete(prompt::READING_SYSTEM, &user_prompt, self.config.temperature)
            .await?;
        let reading = prompt::parse_reading(&raw);

        info!(
            query_len = query.len(),
            retrieved = retrieved.len(),
            fallback = reading.from_fallback,
            "reading generated"
        );
        self.reading_cache.write().await.insert(query.to_string(), reading.clone());
        Ok(reading)
    }

    /// Produce a two-section reading for a combination of 1–3 keywords.
    pub async fn combine(&self, keywords: &[&str]) -> Result<DreamReading> {
        let cleaned: Vec<&str> =
            keywords.iter().map(|kw| kw.trim()).filter(|kw| !kw.is_empty()).collect();
        // Keyed by the keyword list itself: a joined string would
        // conflate ["불 뱀"] with ["불", "뱀"], which prompt differently.
        let cache_key: Vec<String> = cleaned.iter().map(|kw| kw.to_string()).collect();

        if let Some(cached) = self.combine_cache.read().await.get(&cache_key) {
            debug!(keywords = cleaned.len(), "serving cached combined reading");
            return Ok(cached.clone());
        }

        let snapshot = self.snapshot().await?;
        let retriever = Retriever::new(&snapshot, Arc::clone(&self.embedder));
        let retrieved = retriever.retrieve_by_keywords(&cleaned, self.config.top_k).await?;

        let user_prompt = prompt::build_combined_prompt(&cleaned, &retrieved);
        let raw = self
            .chat
            .complete(prompt::COMBINE_SYSTEM, &user_prompt, self.config.temperature)
            .await?;
        let reading = prompt::parse_combined(&raw);

        info!(
            keywords = cleaned.len(),
            retrieved = retrieved.len(),
            fallback = reading.from_fallback,
            "combined reading generated"
        );
        self.combine_cache.write().await.insert(cache_key, reading.clone());
        Ok(reading)
    }
}

/// Builder for constructing a [`DreamLensPipeline`].
#[derive(Default)]
pub struct DreamLensPipelineBuilder {
    config: Option<RagConfig>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    chat: Option<Arc<dyn ChatProvider>>,
}

impl DreamLensPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Set the chat completion provider.
    pub fn chat(mut self, chat: Arc<dyn ChatProvider>) -> Self {
        self.chat = Some(chat);
        self
    }

    /// Build the [`DreamLensPipeline`], validating that all required
    /// fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if any required field is missing.
    pub fn build(self) -> Result<DreamLensPipeline> {
        let config =
            self.config.ok_or_else(|| RagError::Config("config is required".to_string()))?;
        let embedder =
            self.embedder.ok_or_else(|| RagError::Config("embedder is required".to_string()))?;
        let chat = self.chat.ok_or_else(|| RagError::Config("chat is required".to_string()))?;

        Ok(DreamLensPipeline {
            config,
            embedder,
            chat,
            snapshot: RwLock::new(None),
            reading_cache: RwLock::new(HashMap::new()),
            combine_cache: RwLock::new(HashMap::new()),
        })
    }
}
