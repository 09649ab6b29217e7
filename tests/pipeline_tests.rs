//! End-to-end pipeline tests over deterministic mock providers.

use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dreamlens_rag::embedding::EmbeddingProvider;
use dreamlens_rag::error::{RagError, Result};
use dreamlens_rag::generation::ChatProvider;
use dreamlens_rag::prompt::{
    DELIM_CLASSIFICATION, DELIM_INTERPRETATION, DELIM_KEYWORDS, DELIM_SUMMARY,
};
use dreamlens_rag::{DreamLensPipeline, RagConfig};
use tempfile::TempDir;

const DIM: usize = 8;

/// Deterministic text-hash embedder: identical texts map to identical
/// vectors, distinct texts to (almost surely) distinct vectors.
struct HashEmbedder {
    batch_calls: AtomicUsize,
}

impl HashEmbedder {
    fn new() -> Self {
        Self { batch_calls: AtomicUsize::new(0) }
    }

    fn embed_text(text: &str) -> Vec<f32> {
        (0..DIM)
            .map(|component| {
                let mut hasher = std::collections::hash_map::DefaultHasher::new();
                text.hash(&mut hasher);
                component.hash(&mut hasher);
                (hasher.finish() % 1000) as f32 / 500.0 - 1.0
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::embed_text(t)).collect())
    }

    fn dimensions(&self) -> usize {
        DIM
    }
}

/// Embedder whose vectors are shorter than its declared dimensionality.
struct MislabeledEmbedder;

#[async_trait]
impl EmbeddingProvider for MislabeledEmbedder {
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| HashEmbedder::embed_text(t)).collect())
    }

    fn dimensions(&self) -> usize {
        DIM + 1
    }
}

/// Embedder whose every call fails like a transport error.
struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Err(RagError::Provider {
            provider: "mock".into(),
            message: "connection reset by peer".into(),
        })
    }

    fn dimensions(&self) -> usize {
        DIM
    }
}

/// Chat provider returning a canned response and counting calls.
struct CannedChat {
    response: String,
    calls: AtomicUsize,
}

impl CannedChat {
    fn new(response: impl Into<String>) -> Self {
        Self { response: response.into(), calls: AtomicUsize::new(0) }
    }

    fn well_formed() -> Self {
        Self::new(format!(
            "{DELIM_CLASSIFICATION}\n대분류: 동물\n소분류: 뱀\n\
             {DELIM_INTERPRETATION}\n사용자님의 꿈을 자세히 살펴보니 재물운의 징조입니다.\n\
             {DELIM_KEYWORDS}\n뱀, 재물, 행운\n\
             {DELIM_SUMMARY}\n- 좋은 흐름입니다.\n- 기회를 잡으세요.\n- 무리하지 마세요."
        ))
    }
}

#[async_trait]
impl ChatProvider for CannedChat {
    async fn complete(&self, _system: &str, _user: &str, _temperature: f32) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}

const SNAKE_CORPUS: &str = r#"{"동물":{"뱀":[{"꿈":"뱀에게 물렸다","해몽":"재물운이 따른다"}]}}"#;

const THREE_RECORD_CORPUS: &str = r#"{
    "동물": {
        "뱀": [{"꿈": "뱀에게 물렸다", "해몽": "재물운이 따른다"}],
        "호랑이": [{"꿈": "호랑이를 만났다", "해몽": "귀인이 나타난다"}]
    },
    "자연": {
        "물": [{"꿈": "맑은 물을 마셨다", "해몽": "건강이 좋아진다"}]
    }
}"#;

struct Fixture {
    pipeline: DreamLensPipeline,
    embedder: Arc<HashEmbedder>,
    chat: Arc<CannedChat>,
    corpus_path: PathBuf,
    _dir: TempDir,
}

fn fixture_with(corpus_json: &str, chat: CannedChat) -> Fixture {
    let dir = TempDir::new().unwrap();
    let corpus_path = dir.path().join("dream.json");
    std::fs::write(&corpus_path, corpus_json).unwrap();

    let config = RagConfig::builder()
        .index_path(dir.path().join("dream.index"))
        .metadata_path(dir.path().join("dream_meta.json"))
        .build()
        .unwrap();

    let embedder = Arc::new(HashEmbedder::new());
    let chat = Arc::new(chat);
    let pipeline = DreamLensPipeline::builder()
        .config(config)
        .embedder(Arc::clone(&embedder) as Arc<dyn EmbeddingProvider>)
        .chat(Arc::clone(&chat) as Arc<dyn ChatProvider>)
        .build()
        .unwrap();

    Fixture { pipeline, embedder, chat, corpus_path, _dir: dir }
}

#[tokio::test]
async fn snake_scenario_single_record_retrieval() {
    let f = fixture_with(SNAKE_CORPUS, CannedChat::well_formed());
    f.pipeline.ingest_if_absent(&f.corpus_path).await.unwrap();

    assert_eq!(f.pipeline.corpus_size().await.unwrap(), 1);

    let results = f.pipeline.retrieve("뱀").await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].record.category, "동물");
    assert_eq!(results[0].record.subcategory, "뱀");
    assert_eq!(results[0].record.source_text, "뱀에게 물렸다");
    assert_eq!(results[0].record.annotation_text, "재물운이 따른다");
}

#[tokio::test]
async fn alignment_self_query_returns_self_at_zero_distance() {
    let f = fixture_with(THREE_RECORD_CORPUS, CannedChat::well_formed());
    f.pipeline.ingest_if_absent(&f.corpus_path).await.unwrap();
    assert_eq!(f.pipeline.corpus_size().await.unwrap(), 3);

    // Query with each record's own composite embedding text; the
    // nearest hit must be that record at distance ≈ 0.
    let composites = [
        ("대분류: 동물\n소분류: 뱀\n꿈: 뱀에게 물렸다\n해몽: 재물운이 따른다", "뱀에게 물렸다"),
        ("대분류: 동물\n소분류: 호랑이\n꿈: 호랑이를 만났다\n해몽: 귀인이 나타난다", "호랑이를 만났다"),
        ("대분류: 자연\n소분류: 물\n꿈: 맑은 물을 마셨다\n해몽: 건강이 좋아진다", "맑은 물을 마셨다"),
    ];
    for (composite, source_text) in composites {
        let results = f.pipeline.retrieve(composite).await.unwrap();
        assert_eq!(results[0].record.source_text, source_text);
        assert!(results[0].distance.abs() < 1e-6);
    }
}

#[tokio::test]
async fn retrieval_is_ordered_and_bounded_by_corpus_size() {
    let f = fixture_with(THREE_RECORD_CORPUS, CannedChat::well_formed());
    f.pipeline.ingest_if_absent(&f.corpus_path).await.unwrap();

    // top_k defaults to 5, corpus holds 3.
    let results = f.pipeline.retrieve("무서운 꿈").await.unwrap();
    assert_eq!(results.len(), 3);
    for window in results.windows(2) {
        assert!(window[0].distance <= window[1].distance);
    }
}

#[tokio::test]
async fn ingestion_is_idempotent() {
    let f = fixture_with(THREE_RECORD_CORPUS, CannedChat::well_formed());

    f.pipeline.ingest_if_absent(&f.corpus_path).await.unwrap();
    let builds = f.embedder.batch_calls.load(Ordering::SeqCst);
    assert_eq!(builds, 1);

    // Second call loads the persisted pair without re-embedding.
    f.pipeline.ingest_if_absent(&f.corpus_path).await.unwrap();
    assert_eq!(f.embedder.batch_calls.load(Ordering::SeqCst), builds);
    assert_eq!(f.pipeline.corpus_size().await.unwrap(), 3);
}

#[tokio::test]
async fn persisted_pair_round_trips_through_load_existing() {
    let f = fixture_with(THREE_RECORD_CORPUS, CannedChat::well_formed());
    f.pipeline.ingest_if_absent(&f.corpus_path).await.unwrap();
    let before = f.pipeline.retrieve("뱀에게 물렸다").await.unwrap();

    f.pipeline.load_existing().await.unwrap();
    let after = f.pipeline.retrieve("뱀에게 물렸다").await.unwrap();

    assert_eq!(before.len(), after.len());
    for (b, a) in before.iter().zip(&after) {
        assert_eq!(b.record, a.record);
        assert_eq!(b.distance, a.distance);
    }
}

#[tokio::test]
async fn taxonomy_is_derived_from_corpus() {
    let f = fixture_with(THREE_RECORD_CORPUS, CannedChat::well_formed());
    f.pipeline.ingest_if_absent(&f.corpus_path).await.unwrap();

    let taxonomy = f.pipeline.taxonomy().await.unwrap();
    assert_eq!(taxonomy.categories, vec!["동물", "자연"]);
    assert_eq!(taxonomy.subcategories, vec!["물", "뱀", "호랑이"]);
}

#[tokio::test]
async fn fully_filtered_corpus_writes_nothing() {
    let f = fixture_with(
        r#"{"동물":{"뱀":[{"꿈":"","해몽":""},{"꿈":"  ","해몽":"버려짐"}]}}"#,
        CannedChat::well_formed(),
    );

    let err = f.pipeline.ingest_if_absent(&f.corpus_path).await.unwrap_err();
    assert!(matches!(err, RagError::CorpusValidation(_)));
    assert!(!f.pipeline.config().index_path.exists());
    assert!(!f.pipeline.config().metadata_path.exists());
}

#[tokio::test]
async fn serving_before_any_load_is_index_unavailable() {
    let f = fixture_with(SNAKE_CORPUS, CannedChat::well_formed());
    let err = f.pipeline.retrieve("뱀").await.unwrap_err();
    assert!(matches!(err, RagError::IndexUnavailable(_)));
}

#[tokio::test]
async fn load_existing_without_artifacts_is_index_unavailable() {
    let f = fixture_with(SNAKE_CORPUS, CannedChat::well_formed());
    let err = f.pipeline.load_existing().await.unwrap_err();
    assert!(matches!(err, RagError::IndexUnavailable(_)));
}

#[tokio::test]
async fn embedding_transport_failure_surfaces_as_provider_error() {
    let dir = TempDir::new().unwrap();
    let corpus_path = dir.path().join("dream.json");
    std::fs::write(&corpus_path, SNAKE_CORPUS).unwrap();

    let config = RagConfig::builder()
        .index_path(dir.path().join("dream.index"))
        .metadata_path(dir.path().join("dream_meta.json"))
        .build()
        .unwrap();

    let pipeline = DreamLensPipeline::builder()
        .config(config)
        .embedder(Arc::new(FailingEmbedder))
        .chat(Arc::new(CannedChat::well_formed()))
        .build()
        .unwrap();

    let err = pipeline.ingest_if_absent(&corpus_path).await.unwrap_err();
    assert!(matches!(err, RagError::Provider { .. }));
}

#[tokio::test]
async fn vectors_mismatching_declared_dimensions_abort_build() {
    let dir = TempDir::new().unwrap();
    let corpus_path = dir.path().join("dream.json");
    std::fs::write(&corpus_path, SNAKE_CORPUS).unwrap();

    let config = RagConfig::builder()
        .index_path(dir.path().join("dream.index"))
        .metadata_path(dir.path().join("dream_meta.json"))
        .build()
        .unwrap();

    let pipeline = DreamLensPipeline::builder()
        .config(config)
        .embedder(Arc::new(MislabeledEmbedder))
        .chat(Arc::new(CannedChat::well_formed()))
        .build()
        .unwrap();

    let err = pipeline.ingest_if_absent(&corpus_path).await.unwrap_err();
    assert!(matches!(err, RagError::DimensionMismatch { actual: DIM, .. }));
    assert!(!pipeline.config().index_path.exists());
}

#[tokio::test]
async fn interpret_parses_four_sections() {
    let f = fixture_with(SNAKE_CORPUS, CannedChat::well_formed());
    f.pipeline.ingest_if_absent(&f.corpus_path).await.unwrap();

    let reading = f.pipeline.interpret("뱀에게 물리는 꿈을 꿨어요").await.unwrap();
    assert!(!reading.from_fallback);
    assert_eq!(reading.classification, "대분류: 동물\n소분류: 뱀");
    assert_eq!(reading.keywords, "뱀, 재물, 행운");
    assert!(reading.interpretation.contains("재물운의 징조"));
    assert!(reading.summary.contains("- 좋은 흐름입니다."));
}

#[tokio::test]
async fn interpret_falls_back_on_malformed_response() {
    let raw = "구분자 없이 자유롭게 쓴 해몽입니다.";
    let f = fixture_with(SNAKE_CORPUS, CannedChat::new(raw));
    f.pipeline.ingest_if_absent(&f.corpus_path).await.unwrap();

    let reading = f.pipeline.interpret("뱀 꿈").await.unwrap();
    assert!(reading.from_fallback);
    assert_eq!(reading.interpretation, raw);
}

#[tokio::test]
async fn interpret_caches_by_query() {
    let f = fixture_with(SNAKE_CORPUS, CannedChat::well_formed());
    f.pipeline.ingest_if_absent(&f.corpus_path).await.unwrap();

    f.pipeline.interpret("뱀 꿈").await.unwrap();
    f.pipeline.interpret("뱀 꿈").await.unwrap();
    assert_eq!(f.chat.calls.load(Ordering::SeqCst), 1);

    f.pipeline.interpret("호랑이 꿈").await.unwrap();
    assert_eq!(f.chat.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn rebuild_invalidates_cached_readings() {
    let f = fixture_with(SNAKE_CORPUS, CannedChat::well_formed());
    f.pipeline.ingest_if_absent(&f.corpus_path).await.unwrap();

    f.pipeline.interpret("뱀 꿈").await.unwrap();
    assert_eq!(f.chat.calls.load(Ordering::SeqCst), 1);

    f.pipeline.rebuild(&f.corpus_path).await.unwrap();
    f.pipeline.interpret("뱀 꿈").await.unwrap();
    assert_eq!(f.chat.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn empty_dream_text_is_invalid_input() {
    let f = fixture_with(SNAKE_CORPUS, CannedChat::well_formed());
    f.pipeline.ingest_if_absent(&f.corpus_path).await.unwrap();

    let err = f.pipeline.interpret("   ").await.unwrap_err();
    assert!(matches!(err, RagError::InvalidInput(_)));
}

#[tokio::test]
async fn combine_accepts_one_to_three_keywords() {
    let two_section =
        format!("{DELIM_INTERPRETATION}\n조합 해몽입니다.\n{DELIM_SUMMARY}\n- 요약입니다.");
    let f = fixture_with(THREE_RECORD_CORPUS, CannedChat::new(two_section));
    f.pipeline.ingest_if_absent(&f.corpus_path).await.unwrap();

    let reading = f.pipeline.combine(&["불", "뱀"]).await.unwrap();
    assert!(!reading.from_fallback);
    assert_eq!(reading.interpretation, "조합 해몽입니다.");
    assert_eq!(reading.summary, "- 요약입니다.");

    let err = f.pipeline.combine(&[]).await.unwrap_err();
    assert!(matches!(err, RagError::InvalidInput(_)));

    let err = f.pipeline.combine(&["가", "나", "다", "라"]).await.unwrap_err();
    assert!(matches!(err, RagError::InvalidInput(_)));
}

#[tokio::test]
async fn combine_cache_distinguishes_keyword_splits() {
    let two_section =
        format!("{DELIM_INTERPRETATION}\n조합 해몽입니다.\n{DELIM_SUMMARY}\n- 요약입니다.");
    let f = fixture_with(THREE_RECORD_CORPUS, CannedChat::new(two_section));
    f.pipeline.ingest_if_absent(&f.corpus_path).await.unwrap();

    // One keyword containing a space and two separate keywords build
    // different prompts; neither may serve the other's cached reading.
    f.pipeline.combine(&["불 뱀"]).await.unwrap();
    f.pipeline.combine(&["불", "뱀"]).await.unwrap();
    assert_eq!(f.chat.calls.load(Ordering::SeqCst), 2);

    f.pipeline.combine(&["불", "뱀"]).await.unwrap();
    assert_eq!(f.chat.calls.load(Ordering::SeqCst), 2);
}
