//! Data types for corpus records, retrieval results, and generated readings.

use serde::{Deserialize, Serialize};

/// One corpus entry: a dream narrative with its interpretation, placed
/// in a two-level classification.
///
/// Records are created once at ingestion and immutable thereafter.
/// The serialized form matches the persisted metadata file, whose array
/// order mirrors the vector index ordinal positions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DreamRecord {
    /// Top-level classification (대분류).
    pub category: String,
    /// Secondary classification (소분류).
    pub subcategory: String,
    /// The indexed dream narrative (꿈). Non-empty after trimming.
    pub source_text: String,
    /// The associated interpretation (해몽). Non-empty after trimming.
    pub annotation_text: String,
}

/// A retrieved [`DreamRecord`] paired with its squared L2 distance to
/// the query embedding (lower is more similar).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedDream {
    /// The retrieved corpus record.
    pub record: DreamRecord,
    /// Squared Euclidean distance from the query embedding.
    pub distance: f32,
}

/// The distinct classification values observed across the corpus.
///
/// Derived at build/load time, never persisted separately; supplied to
/// generation as the permitted classification vocabulary.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaxonomyCatalog {
    /// Sorted, de-duplicated top-level categories.
    pub categories: Vec<String>,
    /// Sorted, de-duplicated subcategories.
    pub subcategories: Vec<String>,
}

impl TaxonomyCatalog {
    /// Collect the taxonomy from an iterator of (category, subcategory)
    /// pairs, sorting and de-duplicating both axes.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut categories: Vec<String> = Vec::new();
        let mut subcategories: Vec<String> = Vec::new();
        for (category, subcategory) in pairs {
            categories.push(category.to_string());
            subcategories.push(subcategory.to_string());
        }
        categories.sort();
        categories.dedup();
        subcategories.sort();
        subcategories.dedup();
        Self { categories, subcategories }
    }

    /// Whether the catalog carries no values on either axis.
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.subcategories.is_empty()
    }
}

/// A generated dream reading, split into its named sections.
///
/// When the model response could not be parsed into sections,
/// `from_fallback` is set and `interpretation` carries the entire raw
/// response so the caller always has something to show; the remaining
/// sections hold fixed placeholder text. A fallback reading is a
/// degraded-but-non-fatal result, never an error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DreamReading {
    /// Classification commitment (category/subcategory pair, or the
    /// "no match" pair when nothing in the taxonomy applies).
    pub classification: String,
    /// The main interpretive prose. On parse fallback this is the full
    /// unparsed model response.
    pub interpretation: String,
    /// Comma-separated core keywords of the dream.
    pub keywords: String,
    /// Short multi-line summary of the interpretation.
    pub summary: String,
    /// True when delimiter parsing failed and placeholders were used.
    pub from_fallback: bool,
}
