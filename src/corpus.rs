//! Corpus ingestion: parse the nested dream corpus, embed it, and
//! persist the index/metadata pair.
//!
//! Ingestion is a one-time offline step. The two persisted artifacts
//! (index blob and metadata array) are aligned by ordinal position and
//! are always regenerated together; writes go to temporary files that
//! are renamed into place only after both succeed.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::RagConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::index::FlatL2Index;
use crate::record::{DreamRecord, TaxonomyCatalog};

/// A parsed corpus file: category → subcategory → entries.
///
/// `BTreeMap` keeps traversal order stable across builds, so vector
/// ordinal positions are reproducible for identical input.
pub type RawCorpus = BTreeMap<String, BTreeMap<String, Vec<RawEntry>>>;

/// One leaf entry of the corpus file. Field names follow the source
/// data (`꿈` = dream narrative, `해몽` = interpretation); entries with
/// either field missing or blank are filtered out during flattening.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEntry {
    /// The dream narrative.
    #[serde(rename = "꿈", default)]
    pub dream: String,
    /// The interpretation of the dream.
    #[serde(rename = "해몽", default)]
    pub interpretation: String,
}

/// A fully built, immutable corpus: the vector index, the metadata
/// sequence aligned to it by ordinal position, and the derived
/// classification taxonomy.
///
/// Snapshots are shared read-only across concurrent query handlers and
/// replaced wholesale on rebuild, never mutated in place.
#[derive(Debug)]
pub struct CorpusSnapshot {
    /// The vector index over composite embedding texts.
    pub index: FlatL2Index,
    /// Metadata records, `records[i]` paired with vector position `i`.
    pub records: Vec<DreamRecord>,
    /// Distinct classification values observed across the records.
    pub taxonomy: TaxonomyCatalog,
}

/// Strip embedded double-quote characters and surrounding whitespace.
/// Category keys and narratives in the source data carry stray quotes.
fn clean(text: &str) -> String {
    text.replace('"', "").trim().to_string()
}

/// Parse a corpus file's JSON text into the nested mapping.
///
/// # Errors
///
/// Returns [`RagError::CorpusValidation`] if the text is not a valid
/// category → subcategory → entry-list object.
pub fn parse_corpus(json: &str) -> Result<RawCorpus> {
    serde_json::from_str(json)
        .map_err(|e| RagError::CorpusValidation(format!("corpus is not a valid nested mapping: {e}")))
}

/// Flatten the nested corpus into aligned (record, composite text)
/// sequences plus the taxonomy catalog.
///
/// The composite text is the label-aware variant — category and
/// subcategory labels are embedded alongside the narrative and
/// interpretation so retrieval is classification-aware.
///
/// # Errors
///
/// Returns [`RagError::CorpusValidation`] if no entry survives the
/// non-empty-text filter.
pub fn flatten_corpus(corpus: &RawCorpus) -> Result<(Vec<DreamRecord>, Vec<String>)> {
    let mut records = Vec::new();
    let mut composites = Vec::new();

    for (category, subcategories) in corpus {
        let category = clean(category);
        for (subcategory, entries) in subcategories {
            let subcategory = clean(subcategory);
            for entry in entries {
                let dream = clean(&entry.dream);
                let interpretation = entry.interpretation.trim().to_string();
                if dream.is_empty() || interpretation.is_empty() {
                    debug!(%category, %subcategory, "skipping entry with blank narrative or interpretation");
                    continue;
                }

                composites.push(format!(
                    "대분류: {category}\n소분류: {subcategory}\n꿈: {dream}\n해몽: {interpretation}"
                ));
                records.push(DreamRecord {
                    category: category.clone(),
                    subcategory: subcategory.clone(),
                    source_text: dream,
                    annotation_text: interpretation,
                });
            }
        }
    }

    if records.is_empty() {
        return Err(RagError::CorpusValidation(
            "corpus yielded zero admissible records after filtering".to_string(),
        ));
    }

    Ok((records, composites))
}

/// Derive the taxonomy catalog from admitted records.
fn taxonomy_of(records: &[DreamRecord]) -> TaxonomyCatalog {
    TaxonomyCatalog::from_pairs(
        records.iter().map(|r| (r.category.as_str(), r.subcategory.as_str())),
    )
}

/// Build a [`CorpusSnapshot`] from a corpus file: parse → flatten →
/// embed in batches → index. Does not persist; see
/// [`persist_snapshot`].
///
/// # Errors
///
/// - [`RagError::CorpusValidation`] for unreadable/invalid/empty input.
/// - [`RagError::Provider`] if embedding fails; no partial snapshot is
///   produced.
/// - [`RagError::DimensionMismatch`] if the returned vectors do not
///   match the embedder's declared dimensionality.
pub async fn build_corpus(
    corpus_path: &Path,
    embedder: &Arc<dyn EmbeddingProvider>,
) -> Result<CorpusSnapshot> {
    let json = tokio::fs::read_to_string(corpus_path).await.map_err(|e| {
        RagError::CorpusValidation(format!(
            "cannot read corpus file {}: {e}",
            corpus_path.display()
        ))
    })?;
    let corpus = parse_corpus(&json)?;
    let (records, composites) = flatten_corpus(&corpus)?;

    info!(records = records.len(), "embedding corpus");
    let texts: Vec<&str> = composites.iter().map(String::as_str).collect();
    let vectors = embedder.embed_batch(&texts).await?;
    if vectors.len() != records.len() {
        return Err(RagError::Provider {
            provider: "embedding".into(),
            message: format!(
                "provider returned {} vectors for {} records",
                vectors.len(),
                records.len()
            ),
        });
    }
    let expected = embedder.dimensions();
    if let Some(vector) = vectors.first() {
        if vector.len() != expected {
            return Err(RagError::DimensionMismatch { expected, actual: vector.len() });
        }
    }

    let mut index = FlatL2Index::new();
    index.add(&vectors)?;

    let taxonomy = taxonomy_of(&records);
    info!(vectors = index.len(), categories = taxonomy.categories.len(), "corpus built");
    Ok(CorpusSnapshot { index, records, taxonomy })
}

/// Persist a snapshot's index and metadata pair.
///
/// Both artifacts are written to temporary siblings and renamed into
/// place only after both writes succeed, so a crash never leaves a
/// partially written artifact behind. The two renames themselves are
/// not jointly atomic: a crash between them can pair a fresh index
/// with stale metadata. [`load_corpus`] rejects such a pair when the
/// vector and record counts differ; an equal-count stale pairing is
/// undetectable and requires a rebuild.
pub async fn persist_snapshot(snapshot: &CorpusSnapshot, config: &RagConfig) -> Result<()> {
    for path in [&config.index_path, &config.metadata_path] {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
    }

    let index_bytes = snapshot.index.to_bytes()?;
    let meta_bytes = serde_json::to_vec_pretty(&snapshot.records).map_err(|e| {
        RagError::CorpusValidation(format!("failed to serialize metadata: {e}"))
    })?;

    let index_tmp = config.index_path.with_extension("index.tmp");
    let meta_tmp = config.metadata_path.with_extension("json.tmp");

    tokio::fs::write(&index_tmp, &index_bytes).await?;
    tokio::fs::write(&meta_tmp, &meta_bytes).await?;

    tokio::fs::rename(&index_tmp, &config.index_path).await?;
    tokio::fs::rename(&meta_tmp, &config.metadata_path).await?;

    info!(
        index = %config.index_path.display(),
        metadata = %config.metadata_path.display(),
        vectors = snapshot.index.len(),
        "corpus artifacts persisted"
    );
    Ok(())
}

/// Whether both persisted artifacts exist at the configured locations.
pub fn artifacts_exist(config: &RagConfig) -> bool {
    config.index_path.exists() && config.metadata_path.exists()
}

/// Load a previously persisted snapshot.
///
/// # Errors
///
/// Returns [`RagError::IndexUnavailable`] if either artifact is
/// missing, unreadable, or the pair is misaligned (vector count and
/// record count differ). This is distinct from "no results found".
pub async fn load_corpus(config: &RagConfig) -> Result<CorpusSnapshot> {
    let index_bytes = tokio::fs::read(&config.index_path).await.map_err(|e| {
        RagError::IndexUnavailable(format!(
            "cannot read index file {}: {e}",
            config.index_path.display()
        ))
    })?;
    let meta_bytes = tokio::fs::read(&config.metadata_path).await.map_err(|e| {
        RagError::IndexUnavailable(format!(
            "cannot read metadata file {}: {e}",
            config.metadata_path.display()
        ))
    })?;

    let index = FlatL2Index::from_bytes(&index_bytes)?;
    let records: Vec<DreamRecord> = serde_json::from_slice(&meta_bytes).map_err(|e| {
        RagError::IndexUnavailable(format!("metadata file is not a valid record array: {e}"))
    })?;

    if records.len() != index.len() {
        warn!(records = records.len(), vectors = index.len(), "persisted pair is misaligned");
        return Err(RagError::IndexUnavailable(format!(
            "index holds {} vectors but metadata holds {} records; rebuild the corpus",
            index.len(),
            records.len()
        )));
    }

    let taxonomy = taxonomy_of(&records);
    info!(vectors = index.len(), "corpus artifacts loaded");
    Ok(CorpusSnapshot { index, records, taxonomy })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_corpus() -> RawCorpus {
        parse_corpus(
            r#"{
                "\"동물\"": {
                    "뱀": [
                        {"꿈": "뱀에게 물렸다", "해몽": "재물운이 따른다"},
                        {"꿈": "  ", "해몽": "버려지는 항목"}
                    ],
                    "호랑이": [
                        {"꿈": "호랑이를 만났다", "해몽": "귀인이 나타난다"}
                    ]
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn flatten_filters_blank_entries_and_strips_quotes() {
        let (records, composites) = flatten_corpus(&sample_corpus()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(composites.len(), 2);
        assert_eq!(records[0].category, "동물");
        assert_eq!(records[0].source_text, "뱀에게 물렸다");
        assert!(composites[0].starts_with("대분류: 동물\n소분류: 뱀\n꿈: 뱀에게 물렸다"));
    }

    #[test]
    fn flatten_rejects_fully_filtered_corpus() {
        let corpus = parse_corpus(r#"{"동물": {"뱀": [{"꿈": "", "해몽": ""}]}}"#).unwrap();
        let err = flatten_corpus(&corpus).unwrap_err();
        assert!(matches!(err, RagError::CorpusValidation(_)));
    }

    #[test]
    fn entries_missing_fields_are_filtered() {
        let corpus = parse_corpus(
            r#"{"동물": {"뱀": [{"꿈": "해몽 없는 꿈"}, {"해몽": "꿈 없는 해몽"}]}}"#,
        )
        .unwrap();
        let err = flatten_corpus(&corpus).unwrap_err();
        assert!(matches!(err, RagError::CorpusValidation(_)));
    }

    #[test]
    fn non_mapping_corpus_rejected() {
        let err = parse_corpus(r#"[1, 2, 3]"#).unwrap_err();
        assert!(matches!(err, RagError::CorpusValidation(_)));
    }

    #[test]
    fn taxonomy_derived_from_admitted_records() {
        let (records, _) = flatten_corpus(&sample_corpus()).unwrap();
        let taxonomy = taxonomy_of(&records);
        assert_eq!(taxonomy.categories, vec!["동물"]);
        assert_eq!(taxonomy.subcategories, vec!["뱀", "호랑이"]);
    }
}
