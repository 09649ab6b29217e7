//! Retrieval-augmented dream interpretation.
//!
//! `dreamlens-rag` turns a fixed corpus of classified dream/interpretation
//! pairs into a searchable vector index and uses the nearest records as
//! grounding context for a generated, multi-section reading:
//!
//! 1. **Ingestion** ([`corpus`]) — flatten the nested corpus file, embed
//!    it in batches, and persist the index/metadata pair atomically.
//! 2. **Retrieval** ([`retriever`]) — embed a query and return the k
//!    nearest records by exact squared-L2 distance.
//! 3. **Generation** ([`prompt`], [`generation`]) — assemble a grounded
//!    prompt, call a chat model, and parse the delimited response into
//!    named sections with a deterministic fallback.
//!
//! [`DreamLensPipeline`] composes the three stages behind one
//! process-wide handle with swap-on-rebuild snapshot publishing.

pub mod config;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod pipeline;
pub mod prompt;
pub mod record;
pub mod retriever;

pub use config::RagConfig;
pub use corpus::CorpusSnapshot;
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use generation::ChatProvider;
pub use index::FlatL2Index;
pub use pipeline::DreamLensPipeline;
pub use record::{DreamReading, DreamRecord, RetrievedDream, TaxonomyCatalog};
pub use retriever::Retriever;
