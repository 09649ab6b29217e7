//! Append-only flat vector index with exact L2 nearest-neighbor search.
//!
//! The corpus is small (low thousands of records), so brute-force exact
//! search is used; there is no approximate-nearest-neighbor tradeoff.
//! The index is rebuild-to-change: no delete or update operation exists.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RagError, Result};

/// A flat, append-only vector index searched by squared Euclidean (L2)
/// distance.
///
/// Vectors are addressed by ordinal position, assigned monotonically
/// from 0 in insertion order. Dimensionality is fixed by the first
/// [`add`](FlatL2Index::add); later mismatches are construction errors.
///
/// # Example
///
/// ```rust,ignore
/// use dreamlens_rag::index::FlatL2Index;
///
/// let mut index = FlatL2Index::new();
/// index.add(&[vec![0.0, 1.0], vec![1.0, 0.0]])?;
/// let hits = index.search(&[0.0, 0.9], 1)?;
/// assert_eq!(hits[0].0, 0);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FlatL2Index {
    dim: usize,
    data: Vec<f32>,
}

impl FlatL2Index {
    /// Create a new empty index. Dimensionality is fixed on first add.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of vectors stored.
    pub fn len(&self) -> usize {
        if self.dim == 0 { 0 } else { self.data.len() / self.dim }
    }

    /// Whether the index holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Dimensionality fixed by the first add, or 0 while empty.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Append vectors, assigning each the next ordinal position.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DimensionMismatch`] if any vector's length
    /// differs from the index dimensionality (or from the first vector
    /// in the batch for a fresh index). Nothing is appended on error.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        let Some(first) = vectors.first() else {
            return Ok(());
        };

        let dim = if self.dim == 0 { first.len() } else { self.dim };
        if dim == 0 {
            return Err(RagError::DimensionMismatch { expected: 1, actual: 0 });
        }
        for vector in vectors {
            if vector.len() != dim {
                return Err(RagError::DimensionMismatch { expected: dim, actual: vector.len() });
            }
        }

        self.dim = dim;
        self.data.reserve(vectors.len() * dim);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }

        debug!(added = vectors.len(), total = self.len(), dim, "vectors appended to index");
        Ok(())
    }

    /// Exact k-nearest-neighbor search by squared L2 distance.
    ///
    /// Returns `(position, distance)` pairs in ascending distance order,
    /// `min(k, len)` of them.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DimensionMismatch`] if the query length does
    /// not match the index dimensionality.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dim {
            return Err(RagError::DimensionMismatch { expected: self.dim, actual: query.len() });
        }

        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dim)
            .enumerate()
            .map(|(position, vector)| (position, squared_l2(query, vector)))
            .collect();

        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    /// Serialize the index to an opaque byte blob.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            RagError::CorpusValidation(format!("failed to serialize index: {e}"))
        })
    }

    /// Deserialize an index from a blob produced by
    /// [`to_bytes`](FlatL2Index::to_bytes).
    ///
    /// A round-tripped index produces identical search results to the
    /// index that produced the blob.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            RagError::IndexUnavailable(format!("failed to deserialize index: {e}"))
        })
    }
}

/// Squared Euclidean distance between two equal-length vectors.
fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}
