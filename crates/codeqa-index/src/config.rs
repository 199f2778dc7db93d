//! Configuration for the hybrid index.

use std::path::{Path, PathBuf};

use codeqa_fts::FuzzyOptions;
use codeqa_lexical::Bm25Params;
use serde::{Deserialize, Serialize};

// ============================================================================
// HybridConfig
// ============================================================================

/// Tuning and format settings of a [`HybridIndex`](crate::HybridIndex).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridConfig {
    /// Index format version; a mismatch on load triggers a rebuild.
    #[serde(default = "default_version")]
    pub version: String,

    /// BM25 term-frequency saturation.
    #[serde(default = "default_k1")]
    pub k1: f64,

    /// BM25 length normalization.
    #[serde(default = "default_b")]
    pub b: f64,

    /// Multiplier applied to fuzzy scores before merging with BM25.
    #[serde(default = "default_fuzzy_boost")]
    pub fuzzy_boost: f32,

    /// Reciprocal rank fusion smoothing constant.
    #[serde(default = "default_rrf_k")]
    pub rrf_k: usize,

    /// Whether raw embeddings are persisted next to the dense index.
    #[serde(default = "default_true")]
    pub persist_embeddings: bool,

    /// Levenshtein distance of fuzzy term matches.
    #[serde(default = "default_fuzzy_distance")]
    pub fuzzy_distance: u8,

    /// Shortest query token that gets fuzzy expansion.
    #[serde(default = "default_fuzzy_min_term_len")]
    pub fuzzy_min_term_len: usize,

    /// Result count when the caller does not ask for one.
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// Dense weight when the caller does not ask for one.
    #[serde(default = "default_fusion_weight")]
    pub default_fusion_weight: f32,
}

fn default_version() -> String {
    "hybrid-v1".to_string()
}

fn default_k1() -> f64 {
    Bm25Params::default().k1
}

fn default_b() -> f64 {
    Bm25Params::default().b
}

fn default_fuzzy_boost() -> f32 {
    1.1
}

fn default_rrf_k() -> usize {
    60
}

fn default_true() -> bool {
    true
}

fn default_fuzzy_distance() -> u8 {
    FuzzyOptions::default().distance
}

fn default_fuzzy_min_term_len() -> usize {
    FuzzyOptions::default().min_term_len
}

fn default_top_k() -> usize {
    5
}

fn default_fusion_weight() -> f32 {
    0.5
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            k1: default_k1(),
            b: default_b(),
            fuzzy_boost: default_fuzzy_boost(),
            rrf_k: default_rrf_k(),
            persist_embeddings: default_true(),
            fuzzy_distance: default_fuzzy_distance(),
            fuzzy_min_term_len: default_fuzzy_min_term_len(),
            default_top_k: default_top_k(),
            default_fusion_weight: default_fusion_weight(),
        }
    }
}

impl HybridConfig {
    /// BM25 parameters.
    pub fn bm25_params(&self) -> Bm25Params {
        Bm25Params {
            k1: self.k1,
            b: self.b,
        }
    }

    /// Fuzzy matching options.
    pub fn fuzzy_options(&self) -> FuzzyOptions {
        FuzzyOptions {
            distance: self.fuzzy_distance,
            min_term_len: self.fuzzy_min_term_len,
        }
    }
}

// ============================================================================
// IndexPaths
// ============================================================================

/// Location of every persisted artifact of one index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexPaths {
    /// Dense inner-product index.
    pub dense: PathBuf,
    /// Ordered document texts.
    pub docs: PathBuf,
    /// Tokenized documents, same order as `docs`.
    pub tokens: PathBuf,
    /// BM25 statistics.
    pub keywords: PathBuf,
    /// Raw embedding matrix (optional artifact).
    pub embeddings: PathBuf,
    /// Version and checksum metadata.
    pub meta: PathBuf,
    /// Fuzzy inverted index directory.
    pub fuzzy_dir: PathBuf,
}

impl IndexPaths {
    /// Standard artifact names inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            dense: dir.join("rag_index.flat"),
            docs: dir.join("docs.json"),
            tokens: dir.join("docs_tokens.json"),
            keywords: dir.join("docs_keywords.json"),
            embeddings: dir.join("embeddings.flat"),
            meta: dir.join("index_meta.json"),
            fuzzy_dir: dir.join("fuzzy_index"),
        }
    }

}
