//! Nearest-neighbor retrieval of corpus records for a query string.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::corpus::CorpusSnapshot;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::record::RetrievedDream;

/// Maximum number of keywords accepted by
/// [`Retriever::retrieve_by_keywords`].
pub const MAX_KEYWORDS: usize = 3;

/// Retrieves the records most similar to a query.
///
/// Borrows a read-only [`CorpusSnapshot`]; retrieval never mutates the
/// snapshot, so one snapshot may serve any number of concurrent
/// retrievers.
pub struct Retriever<'a> {
    snapshot: &'a CorpusSnapshot,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl<'a> Retriever<'a> {
    /// Create a retriever over a corpus snapshot.
    pub fn new(snapshot: &'a CorpusSnapshot, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { snapshot, embedder }
    }

    /// Retrieve the `k` records nearest to `query`, ascending distance.
    ///
    /// Positions reported by the index that fall outside the metadata
    /// sequence are dropped; if every candidate is out of bounds the
    /// persisted pair is misaligned and [`RagError::EmptyResult`] is
    /// returned so the fault is distinguishable from an empty corpus.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidInput`] for a blank query.
    /// - [`RagError::Provider`] if query embedding fails; no partial
    ///   result is returned.
    /// - [`RagError::EmptyResult`] on index/metadata misalignment.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedDream>> {
        if query.trim().is_empty() {
            return Err(RagError::InvalidInput("query must not be empty".to_string()));
        }

        let query_vector = self.embedder.embed(query).await?;
        let hits = self.snapshot.index.search(&query_vector, k)?;

        let records = &self.snapshot.records;
        let candidate_count = hits.len();
        let mut results = Vec::with_capacity(candidate_count);
        for (position, distance) in hits {
            match records.get(position) {
                Some(record) => {
                    results.push(RetrievedDream { record: record.clone(), distance });
                }
                None => {
                    warn!(position, records = records.len(), "dropping out-of-bounds index hit");
                }
            }
        }

        if results.is_empty() && candidate_count > 0 {
            return Err(RagError::EmptyResult(
                "all index hits fell outside the metadata sequence; the persisted pair is misaligned"
                    .to_string(),
            ));
        }

        debug!(query_len = query.len(), k, returned = results.len(), "retrieval completed");
        Ok(results)
    }

    /// Retrieve by 1–3 short keywords, joined with single spaces into
    /// one query string.
    ///
    /// # Errors
    ///
    /// [`RagError::InvalidInput`] unless between 1 and
    /// [`MAX_KEYWORDS`] keywords are non-empty after trimming;
    /// otherwise as [`retrieve`](Retriever::retrieve).
    pub async fn retrieve_by_keywords(
        &self,
        keywords: &[&str],
        k: usize,
    ) -> Result<Vec<RetrievedDream>> {
        let cleaned: Vec<&str> =
            keywords.iter().map(|kw| kw.trim()).filter(|kw| !kw.is_empty()).collect();
        if cleaned.is_empty() || cleaned.len() > MAX_KEYWORDS {
            return Err(RagError::InvalidInput(format!(
                "between 1 and {MAX_KEYWORDS} keywords are required, got {}",
                cleaned.len()
            )));
        }

        let query = cleaned.join(" ");
        self.retrieve(&query, k).await
    }
}
