//! Error types for the `dreamlens-rag` crate.

use thiserror::Error;

/// Errors that can occur in the retrieval and generation pipeline.
#[derive(Debug, Error)]
pub enum RagError {
    /// A remote embedding or chat-completion call failed (transport,
    /// quota, timeout, or malformed response). Never retried by the
    /// core; callers may retry with backoff.
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// The remote provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The persisted index or metadata file is missing or unreadable.
    ///
    /// Fatal for retrieval: the pipeline refuses to serve queries until
    /// the corpus is (re)built. Distinct from "no results found".
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    /// The ingestion input was not a valid nested corpus, or yielded
    /// zero admissible records after filtering. Nothing is written.
    #[error("Corpus validation error: {0}")]
    CorpusValidation(String),

    /// Retrieval produced no in-bounds candidates despite a loaded
    /// index — an index/metadata alignment fault, not a transient error.
    #[error("Empty result: {0}")]
    EmptyResult(String),

    /// A vector's length does not match the index dimensionality.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimensionality fixed by the first vector added to the index.
        expected: usize,
        /// Dimensionality of the offending vector.
        actual: usize,
    },

    /// Caller-supplied input was missing or empty.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An I/O failure while persisting or loading corpus artifacts.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience result type for pipeline operations.
pub type Result<T> = std::result::Result<T, RagError>;
