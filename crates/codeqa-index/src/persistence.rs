//! Persisted artifacts and freshness metadata.
//!
//! Documents, tokens and BM25 statistics are JSON; the dense index and raw
//! embeddings use the binary codec in `codeqa_vector::flat`. Every file is
//! written atomically.

use std::path::Path;

use codeqa_core::Result;
use codeqa_core::util::files::{read_artifact, write_atomic};
use codeqa_lexical::KeywordData;
use codeqa_vector::FlatIpIndex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::IndexPaths;

/// Metadata stored next to an index for staleness detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    /// Index format version at build time.
    pub version: String,

    /// Corpus checksum, see [`corpus_checksum`].
    pub checksum: String,

    /// Number of documents indexed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_count: Option<usize>,

    /// Embedding dimension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_dimension: Option<usize>,

    /// Embedding model name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Build timestamp (RFC 3339).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub built_at: Option<String>,
}

impl IndexMeta {
    /// Metadata with only the two fields staleness depends on.
    pub fn new(version: impl Into<String>, checksum: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            checksum: checksum.into(),
            document_count: None,
            embedding_dimension: None,
            model: None,
            built_at: None,
        }
    }
}

/// Content hash of an ordered corpus as lowercase hex.
///
/// Each document contributes its byte length (u64 LE) and then its bytes,
/// so `["ab", "c"]` and `["a", "bc"]` hash differently.
pub fn corpus_checksum<S: AsRef<str>>(docs: &[S]) -> String {
    let mut hasher = blake3::Hasher::new();
    for doc in docs {
        let bytes = doc.as_ref().as_bytes();
        hasher.update(&(bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    }
    hasher.finalize().to_hex().to_string()
}

// ============================================================================
// Freshness
// ============================================================================

/// Outcome of [`check_freshness`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Freshness {
    /// Whether a load would reuse the persisted dense index.
    pub fresh: bool,
    /// Why it would not.
    pub reasons: Vec<String>,
}

/// Whether the artifacts at `paths` match their own corpus and `version`.
///
/// Mirrors the checks a load performs, except the model dimension, which
/// is compared against the dimension recorded at build time instead.
pub fn check_freshness(paths: &IndexPaths, version: &str) -> Result<Freshness> {
    let docs = load_docs(&paths.docs)?;
    let mut reasons = Vec::new();

    match load_meta(&paths.meta) {
        Ok(meta) => {
            if meta.version != version {
                reasons.push(format!("version {} differs from {version}", meta.version));
            }
            if meta.checksum != corpus_checksum(&docs) {
                reasons.push("corpus checksum mismatch".to_string());
            }
            match FlatIpIndex::load(&paths.dense) {
                Ok(dense) => {
                    if dense.len() != docs.len() {
                        reasons.push(format!(
                            "dense index has {} rows for {} documents",
                            dense.len(),
                            docs.len()
                        ));
                    }
                    if let Some(dimension) = meta.embedding_dimension
                        && dimension != dense.dimension()
                    {
                        reasons.push(format!(
                            "dense dimension {} differs from recorded {dimension}",
                            dense.dimension()
                        ));
                    }
                }
                Err(e) => reasons.push(format!("dense index unreadable: {e}")),
            }
        }
        Err(e) => reasons.push(format!("metadata unreadable: {e}")),
    }

    Ok(Freshness {
        fresh: reasons.is_empty(),
        reasons,
    })
}

// ============================================================================
// JSON artifacts
// ============================================================================

fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec(value)?;
    write_atomic(path, &json)
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = read_artifact(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Save the ordered document texts.
pub fn save_docs(path: &Path, docs: &[String]) -> Result<()> {
    save_json(path, docs)
}

/// Load the ordered document texts.
pub fn load_docs(path: &Path) -> Result<Vec<String>> {
    load_json(path)
}

/// Save the tokenized documents.
pub fn save_tokens(path: &Path, tokens: &[Vec<String>]) -> Result<()> {
    save_json(path, tokens)
}

/// Load the tokenized documents.
pub fn load_tokens(path: &Path) -> Result<Vec<Vec<String>>> {
    load_json(path)
}

/// Save BM25 statistics.
pub fn save_keywords(path: &Path, data: &KeywordData) -> Result<()> {
    save_json(path, data)
}

/// Load BM25 statistics.
pub fn load_keywords(path: &Path) -> Result<KeywordData> {
    load_json(path)
}

/// Save index metadata, pretty-printed.
pub fn save_meta(path: &Path, meta: &IndexMeta) -> Result<()> {
    let json = serde_json::to_string_pretty(meta)?;
    write_atomic(path, json.as_bytes())
}

/// Load index metadata.
pub fn load_meta(path: &Path) -> Result<IndexMeta> {
    load_json(path)
}

// ============================================================================
// Tests
// ============================================================================
