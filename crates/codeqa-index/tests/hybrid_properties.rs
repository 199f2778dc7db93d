//! End-to-end properties of `HybridIndex`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use codeqa_core::{Error, Result};
use codeqa_fts::FuzzyIndex;
use codeqa_index::persistence::{load_meta, save_meta};
use codeqa_index::{
    HybridConfig, HybridIndex, IndexPaths, corpus_checksum, merge_keyword_hits,
};
use codeqa_lexical::KeywordIndex;
use codeqa_vector::{EmbeddingProvider, FlatIpIndex, MockEmbeddingProvider};
use tempfile::tempdir;

/// Returns fixed vectors for known texts and the last axis otherwise.
struct TableEmbedder {
    table: HashMap<String, Vec<f32>>,
    dimension: usize,
}

impl TableEmbedder {
    fn new(dimension: usize, entries: &[(&str, &[f32])]) -> Self {
        Self {
            table: entries
                .iter()
                .map(|(text, v)| (text.to_string(), v.to_vec()))
                .collect(),
            dimension,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for TableEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.table.get(text).cloned().unwrap_or_else(|| {
            let mut v = vec![0.0; self.dimension];
            v[self.dimension - 1] = 1.0;
            v
        }))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "table"
    }
}

fn corpus() -> Vec<String> {
    [
        "fn parse_config reads the configuration file",
        "struct Retriever wraps the vector index",
        "the fuzzy index tolerates typos in queries",
        "bm25 scores documents by term frequency",
        "load rebuilds the index when the checksum changes",
        "directory swap keeps the previous index as backup",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn mock_index(dir: &Path, dimension: usize) -> HybridIndex {
    HybridIndex::new(
        HybridConfig::default(),
        IndexPaths::in_dir(dir),
        Arc::new(MockEmbeddingProvider::new(dimension)),
    )
}

fn ordinals(results: &[codeqa_index::ScoredDocument]) -> Vec<usize> {
    results.iter().map(|r| r.ordinal).collect()
}

// ============================================================================
// Reload
// ============================================================================

#[tokio::test]
async fn reload_returns_identical_results() {
    let dir = tempdir().unwrap();
    let built = mock_index(dir.path(), 64);
    built.build(corpus()).await.unwrap();

    let loaded = mock_index(dir.path(), 64);
    loaded.load().await.unwrap();

    for query in ["index", "fuzy indx typos", "configuration file", ""] {
        for k in [1, 3, 10] {
            for weight in [0.0, 0.3, 0.5, 1.0] {
                assert_eq!(
                    built.search(query, k, weight).await.unwrap(),
                    loaded.search(query, k, weight).await.unwrap(),
                    "query {query:?} k {k} weight {weight}"
                );
            }
        }
    }
}

#[tokio::test]
async fn reload_twice_is_stable() {
    let dir = tempdir().unwrap();
    mock_index(dir.path(), 32).build(corpus()).await.unwrap();
    let dense_before = std::fs::read(IndexPaths::in_dir(dir.path()).dense).unwrap();

    let index = mock_index(dir.path(), 32);
    index.load().await.unwrap();
    index.load().await.unwrap();

    let dense_after = std::fs::read(IndexPaths::in_dir(dir.path()).dense).unwrap();
    assert_eq!(dense_before, dense_after);
    assert_eq!(index.status().document_count, 6);
}

// ============================================================================
// Fusion weight boundaries
// ============================================================================

#[tokio::test]
async fn weight_one_follows_dense_ranking() {
    let dir = tempdir().unwrap();
    let docs: Vec<String> = ["alpha one", "beta two", "gamma three", "delta four"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let embedder = TableEmbedder::new(
        3,
        &[
            ("alpha one", &[0.0, 1.0, 0.0]),
            ("beta two", &[1.0, 0.0, 0.0]),
            ("gamma three", &[0.6, 0.8, 0.0]),
            ("delta four", &[0.8, 0.6, 0.0]),
            ("alpha", &[1.0, 0.0, 0.0]),
        ],
    );
    let index = HybridIndex::new(
        HybridConfig::default(),
        IndexPaths::in_dir(dir.path()),
        Arc::new(embedder),
    );
    index.build(docs).await.unwrap();

    let dense_only = index.search("alpha", 3, 1.0).await.unwrap();
    assert_eq!(ordinals(&dense_only), vec![1, 3, 2]);

    // "alpha" only appears lexically in document 0
    let keyword_only = index.search("alpha", 3, 0.0).await.unwrap();
    assert_eq!(ordinals(&keyword_only), vec![0]);
}

#[tokio::test]
async fn weight_zero_follows_keyword_ranking() {
    let dir = tempdir().unwrap();
    let index = mock_index(&dir.path().join("hybrid"), 64);
    index.build(corpus()).await.unwrap();

    let docs = corpus();
    let keyword = KeywordIndex::build(&docs);
    let fuzzy = FuzzyIndex::build(
        &docs,
        &dir.path().join("fuzzy"),
        HybridConfig::default().fuzzy_options(),
    )
    .unwrap();

    for query in ["index", "the checksum", "fuzy typos"] {
        let k = 4;
        let expected: Vec<usize> = merge_keyword_hits(
            &keyword.search(query, k),
            &fuzzy.search(query, k).unwrap(),
            1.1,
        )
        .into_iter()
        .map(|(ordinal, _)| ordinal)
        .take(k)
        .collect();

        let results = index.search(query, k, 0.0).await.unwrap();
        assert_eq!(ordinals(&results), expected, "query {query:?}");
    }
}

#[tokio::test]
async fn out_of_range_weights_are_clamped() {
    let dir = tempdir().unwrap();
    let index = mock_index(dir.path(), 64);
    index.build(corpus()).await.unwrap();

    assert_eq!(
        index.search("index", 4, 3.0).await.unwrap(),
        index.search("index", 4, 1.0).await.unwrap()
    );
    assert_eq!(
        index.search("index", 4, -1.0).await.unwrap(),
        index.search("index", 4, 0.0).await.unwrap()
    );
}

// ============================================================================
// Worked fusion example
// ============================================================================

#[tokio::test]
async fn cat_query_fuses_both_lists() {
    let dir = tempdir().unwrap();
    let embedder = TableEmbedder::new(
        3,
        &[
            ("the cat sat", &[1.0, 0.0, 0.0]),
            ("the dog ran", &[0.0, -1.0, 0.0]),
            ("cats and dogs", &[0.6, 0.8, 0.0]),
            ("cat", &[1.0, 0.0, 0.0]),
        ],
    );
    let index = HybridIndex::new(
        HybridConfig::default(),
        IndexPaths::in_dir(dir.path()),
        Arc::new(embedder),
    );
    index
        .build(vec![
            "the cat sat".into(),
            "the dog ran".into(),
            "cats and dogs".into(),
        ])
        .await
        .unwrap();

    let results = index.search("cat", 2, 0.5).await.unwrap();
    assert_eq!(ordinals(&results), vec![0, 2]);
    assert!((results[0].score - 1.0 / 61.0).abs() < 1e-6);
    assert!(results[0].score > results[1].score);
    assert_eq!(results[0].text, "the cat sat");
}

// ============================================================================
// Staleness
// ============================================================================

#[tokio::test]
async fn checksum_mismatch_rebuilds_dense_index() {
    let dir = tempdir().unwrap();
    let paths = IndexPaths::in_dir(dir.path());
    mock_index(dir.path(), 16).build(corpus()).await.unwrap();
    let good_dense = std::fs::read(&paths.dense).unwrap();

    // Same shape, wrong content
    let bogus = FlatIpIndex::from_vectors(16, vec![vec![0.25; 16]; 6]).unwrap();
    bogus.save(&paths.dense).unwrap();
    let mut meta = load_meta(&paths.meta).unwrap();
    meta.checksum = "not-the-checksum".into();
    save_meta(&paths.meta, &meta).unwrap();

    let index = mock_index(dir.path(), 16);
    index.load().await.unwrap();

    assert_eq!(std::fs::read(&paths.dense).unwrap(), good_dense);
    assert_eq!(load_meta(&paths.meta).unwrap().checksum, corpus_checksum(&corpus()));
}

#[tokio::test]
async fn matching_checksum_trusts_persisted_dense_index() {
    let dir = tempdir().unwrap();
    let paths = IndexPaths::in_dir(dir.path());
    mock_index(dir.path(), 16).build(corpus()).await.unwrap();

    let tampered = FlatIpIndex::from_vectors(16, vec![vec![0.25; 16]; 6]).unwrap();
    tampered.save(&paths.dense).unwrap();
    let tampered_bytes = std::fs::read(&paths.dense).unwrap();

    mock_index(dir.path(), 16).load().await.unwrap();
    assert_eq!(std::fs::read(&paths.dense).unwrap(), tampered_bytes);
}

#[tokio::test]
async fn version_mismatch_rebuilds() {
    let dir = tempdir().unwrap();
    let paths = IndexPaths::in_dir(dir.path());
    mock_index(dir.path(), 16).build(corpus()).await.unwrap();

    let config = HybridConfig {
        version: "hybrid-v2".into(),
        ..Default::default()
    };
    let index = HybridIndex::new(config, paths.clone(), Arc::new(MockEmbeddingProvider::new(16)));
    index.load().await.unwrap();
    assert_eq!(load_meta(&paths.meta).unwrap().version, "hybrid-v2");
}

#[tokio::test]
async fn dimension_change_rebuilds() {
    let dir = tempdir().unwrap();
    mock_index(dir.path(), 16).build(corpus()).await.unwrap();

    let index = mock_index(dir.path(), 48);
    index.load().await.unwrap();
    assert_eq!(index.status().dimension, Some(48));
    assert!(!index.search("index", 3, 1.0).await.unwrap().is_empty());
}

#[tokio::test]
async fn corrupt_dense_file_rebuilds() {
    let dir = tempdir().unwrap();
    let paths = IndexPaths::in_dir(dir.path());
    mock_index(dir.path(), 16).build(corpus()).await.unwrap();
    let good_dense = std::fs::read(&paths.dense).unwrap();

    std::fs::write(&paths.dense, b"garbage").unwrap();
    let index = mock_index(dir.path(), 16);
    index.load().await.unwrap();

    assert_eq!(std::fs::read(&paths.dense).unwrap(), good_dense);
    assert!(index.is_ready());
}

#[tokio::test]
async fn missing_fuzzy_index_is_rebuilt_on_load() {
    let dir = tempdir().unwrap();
    let paths = IndexPaths::in_dir(dir.path());
    mock_index(dir.path(), 16).build(corpus()).await.unwrap();
    std::fs::remove_dir_all(&paths.fuzzy_dir).unwrap();

    let index = mock_index(dir.path(), 16);
    index.load().await.unwrap();
    assert!(FuzzyIndex::exists(&paths.fuzzy_dir));
    let results = index.search("fuzy typoes", 3, 0.0).await.unwrap();
    assert_eq!(results[0].ordinal, 2);
}

// ============================================================================
// Empty-input contracts
// ============================================================================

#[tokio::test]
async fn empty_build_is_bad_input() {
    let dir = tempdir().unwrap();
    let err = mock_index(dir.path(), 16).build(Vec::new()).await.unwrap_err();
    assert!(matches!(err, Error::BuildInput(_)));
}

#[tokio::test]
async fn empty_query_does_not_fail() {
    let dir = tempdir().unwrap();
    let index = mock_index(dir.path(), 16);
    index.build(corpus()).await.unwrap();

    let results = index.search("", 3, 0.5).await.unwrap();
    assert!(results.len() <= 3);
    let keyword_only = index.search("   ", 3, 0.0).await.unwrap();
    assert!(keyword_only.is_empty());
}

#[tokio::test]
async fn empty_persisted_corpus_has_no_contexts() {
    let dir = tempdir().unwrap();
    let paths = IndexPaths::in_dir(dir.path());
    std::fs::write(&paths.docs, "[]").unwrap();
    std::fs::write(&paths.tokens, "[]").unwrap();
    std::fs::write(&paths.keywords, "{}").unwrap();

    let index = mock_index(dir.path(), 16);
    index.load().await.unwrap();
    let err = index.search("anything", 3, 0.5).await.unwrap_err();
    assert!(matches!(err, Error::IndexNotReady(_)));
    assert!(err.to_string().contains("no contexts"));
}
