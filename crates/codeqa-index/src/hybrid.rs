//! The hybrid retrieval index.
//!
//! [`HybridIndex`] owns three views of one ordered corpus snapshot:
//!
//! - a dense [`FlatIpIndex`] over unit-length embeddings,
//! - a BM25 [`KeywordIndex`],
//! - a fuzzy [`FuzzyIndex`] for typo-tolerant recall.
//!
//! Document ordinals join the three. Queries run all engines, fold fuzzy
//! hits into BM25 hits, and fuse the dense and keyword lists by weighted
//! reciprocal rank.
//!
//! # States
//!
//! An index starts unloaded. A successful [`build`](HybridIndex::build) or
//! [`load`](HybridIndex::load) swaps in a complete ready state; a failed one
//! leaves the previous state in place. Searches work on a snapshot taken at
//! the start of the call, so a concurrent rebuild never shows them a mix.

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use codeqa_core::{Error, Result};
use codeqa_fts::FuzzyIndex;
use codeqa_lexical::KeywordIndex;
use codeqa_vector::cache::cache_key;
use codeqa_vector::{
    EmbeddingMatrix, EmbeddingProvider, FlatIpIndex, QueryEmbeddingCache, l2_normalize,
};
use serde::{Deserialize, Serialize};

use crate::config::{HybridConfig, IndexPaths};
use crate::fusion::{merge_keyword_hits, weighted_rrf};
use crate::persistence::{
    IndexMeta, corpus_checksum, load_docs, load_keywords, load_meta, load_tokens, save_docs,
    save_keywords, save_meta, save_tokens,
};

/// Documents per embedding call during a build.
const EMBED_BATCH_SIZE: usize = 64;

// ============================================================================
// Public types
// ============================================================================

/// One fused search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    /// Position of the document in the corpus snapshot.
    pub ordinal: usize,
    /// Document text.
    pub text: String,
    /// Fused rank score (higher is better).
    pub score: f32,
}

/// Snapshot of an index's readiness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStatus {
    /// Whether searches can run.
    pub ready: bool,
    /// Documents in the loaded corpus.
    pub document_count: usize,
    /// Dimension of the loaded dense index.
    pub dimension: Option<usize>,
    /// Embedding model serving queries.
    pub model: String,
}

/// Everything a search needs, swapped in as a unit.
struct ReadyState {
    docs: Arc<Vec<String>>,
    dense: Arc<FlatIpIndex>,
    keyword: Arc<KeywordIndex>,
    fuzzy: FuzzyIndex,
}

// ============================================================================
// HybridIndex
// ============================================================================

/// Dense + BM25 + fuzzy index over one corpus snapshot.
pub struct HybridIndex {
    config: HybridConfig,
    paths: IndexPaths,
    embedder: Arc<dyn EmbeddingProvider>,
    cache: Option<Arc<dyn QueryEmbeddingCache>>,
    state: RwLock<Option<Arc<ReadyState>>>,
}

impl HybridIndex {
    /// Create an unloaded index persisting to `paths`.
    pub fn new(
        config: HybridConfig,
        paths: IndexPaths,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            config,
            paths,
            embedder,
            cache: None,
            state: RwLock::new(None),
        }
    }

    /// Memoize query embeddings in `cache`.
    pub fn with_cache(mut self, cache: Arc<dyn QueryEmbeddingCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Build from `docs`, persist every artifact, and become ready.
    ///
    /// Fails with [`Error::BuildInput`] on an empty corpus. On any failure
    /// the previous in-memory state is kept.
    pub async fn build(&self, docs: Vec<String>) -> Result<()> {
        if docs.is_empty() {
            return Err(Error::build_input(
                "Cannot build an index from an empty document set",
            ));
        }

        log::info!(
            "Building hybrid index over {} documents into {}",
            docs.len(),
            self.paths.docs.display()
        );
        let dense = self.embed_documents(&docs).await?;
        let state = self.materialize(docs, dense).await?;
        self.install(state);
        Ok(())
    }

    /// Load persisted artifacts and become ready.
    ///
    /// Rebuilds from the persisted documents when the dense index is
    /// unreadable or has the wrong dimension, or when the metadata version
    /// or corpus checksum disagrees. Fails with
    /// [`Error::PersistenceMissing`] if documents, tokens or BM25
    /// statistics cannot be read.
    pub async fn load(&self) -> Result<()> {
        let docs = load_docs(&self.paths.docs).map_err(|e| missing("documents", e))?;
        let tokens = load_tokens(&self.paths.tokens).map_err(|e| missing("tokens", e))?;
        let keywords = load_keywords(&self.paths.keywords).map_err(|e| missing("keywords", e))?;

        let meta = match load_meta(&self.paths.meta) {
            Ok(meta) => Some(meta),
            Err(e) => {
                log::warn!("Index metadata unreadable: {e}");
                None
            }
        };
        let dense = match FlatIpIndex::load(&self.paths.dense) {
            Ok(dense) => Some(dense),
            Err(e) => {
                log::warn!("Dense index unreadable: {e}");
                None
            }
        };

        let stale = self.staleness(
            &docs,
            &tokens,
            keywords.doc_lengths.len(),
            meta.as_ref(),
            dense.as_ref(),
        );
        let dense = match (stale, dense) {
            (None, Some(dense)) => dense,
            (reason, _) => {
                let reason = reason.unwrap_or_else(|| "dense index unreadable".to_string());
                log::warn!("Rebuilding index from persisted documents: {reason}");
                return self.rebuild_from(docs).await;
            }
        };

        if let Some(model) = meta.as_ref().and_then(|m| m.model.as_deref())
            && model != self.embedder.name()
        {
            log::warn!(
                "Index was embedded with {model} but queries use {}; same dimension, not rebuilding",
                self.embedder.name()
            );
        }

        let keyword = KeywordIndex::from_persisted(tokens, keywords);
        let docs = Arc::new(docs);
        let fuzzy = self.open_or_build_fuzzy(docs.clone()).await?;

        log::info!("Loaded hybrid index with {} documents", docs.len());
        self.install(ReadyState {
            docs,
            dense: Arc::new(dense),
            keyword: Arc::new(keyword),
            fuzzy,
        });
        Ok(())
    }

    /// Re-derive the lexical and fuzzy structures from persisted documents.
    ///
    /// The dense index comes from persisted raw embeddings when they match
    /// the corpus and the current model; otherwise documents are re-embedded.
    pub async fn rebuild_lexical(&self) -> Result<()> {
        let docs = load_docs(&self.paths.docs).map_err(|e| missing("documents", e))?;
        if docs.is_empty() {
            return Err(Error::build_input("Persisted document set is empty"));
        }

        let dense = match EmbeddingMatrix::load(&self.paths.embeddings) {
            Ok(matrix)
                if matrix.rows() == docs.len()
                    && matrix.dimension() == self.embedder.dimension() =>
            {
                log::debug!("Reusing {} persisted embeddings", matrix.rows());
                FlatIpIndex::from_matrix(matrix)
            }
            Ok(_) => {
                log::info!("Persisted embeddings do not match the corpus; re-embedding");
                self.embed_documents(&docs).await?
            }
            Err(e) => {
                log::info!("Persisted embeddings unavailable ({e}); re-embedding");
                self.embed_documents(&docs).await?
            }
        };

        let state = self.materialize(docs, dense).await?;
        self.install(state);
        Ok(())
    }

    /// Top `k` documents for `query`.
    ///
    /// `fusion_weight` weights the dense ranking against the keyword
    /// ranking and is clamped to `[0, 1]`. Fails with
    /// [`Error::IndexNotReady`] before a build or load, or when the corpus
    /// has no documents.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        fusion_weight: f32,
    ) -> Result<Vec<ScoredDocument>> {
        let state = self
            .current()
            .ok_or_else(|| Error::not_ready("Index is not loaded; build or load it first"))?;
        if state.docs.is_empty() {
            return Err(Error::not_ready("no contexts"));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let count = state.docs.len();
        let query_vector = self.embed_query(query).await?;
        let dense_hits: Vec<_> = state
            .dense
            .search(&query_vector, k)?
            .into_iter()
            .filter(|(ordinal, _)| *ordinal < count)
            .collect();

        let bm25_hits = state.keyword.search(query, k);
        let fuzzy_hits = state.fuzzy.search(query, k)?;
        let keyword_hits = merge_keyword_hits(&bm25_hits, &fuzzy_hits, self.config.fuzzy_boost);

        log::debug!(
            "Query hits: {} dense, {} bm25, {} fuzzy",
            dense_hits.len(),
            bm25_hits.len(),
            fuzzy_hits.len()
        );

        let fused = weighted_rrf(&dense_hits, &keyword_hits, fusion_weight, self.config.rrf_k);
        Ok(fused
            .into_iter()
            .filter_map(|(ordinal, score)| {
                state.docs.get(ordinal).map(|text| ScoredDocument {
                    ordinal,
                    text: text.clone(),
                    score,
                })
            })
            .take(k)
            .collect())
    }

    /// Search with the configured default `k` and fusion weight.
    pub async fn search_default(&self, query: &str) -> Result<Vec<ScoredDocument>> {
        self.search(query, self.config.default_top_k, self.config.default_fusion_weight)
            .await
    }

    /// Readiness report.
    pub fn status(&self) -> IndexStatus {
        let state = self.current();
        IndexStatus {
            ready: state.is_some(),
            document_count: state.as_ref().map_or(0, |s| s.docs.len()),
            dimension: state.as_ref().map(|s| s.dense.dimension()),
            model: self.embedder.name().to_string(),
        }
    }

    /// Whether searches can run.
    pub fn is_ready(&self) -> bool {
        self.current().is_some()
    }

    /// The same index addressed at `paths`, after its files were moved.
    ///
    /// Shares the loaded structures and reopens the fuzzy index at its new
    /// location. An unloaded index rebases to an unloaded index.
    pub fn rebased(&self, paths: IndexPaths) -> Result<Self> {
        let state = match self.current() {
            Some(state) => {
                let fuzzy = FuzzyIndex::open(&paths.fuzzy_dir, self.config.fuzzy_options())?;
                Some(Arc::new(ReadyState {
                    docs: state.docs.clone(),
                    dense: state.dense.clone(),
                    keyword: state.keyword.clone(),
                    fuzzy,
                }))
            }
            None => None,
        };

        Ok(Self {
            config: self.config.clone(),
            paths,
            embedder: self.embedder.clone(),
            cache: self.cache.clone(),
            state: RwLock::new(state),
        })
    }

    /// Index configuration.
    pub fn config(&self) -> &HybridConfig {
        &self.config
    }

    /// Artifact locations.
    pub fn paths(&self) -> &IndexPaths {
        &self.paths
    }

    /// The embedding provider.
    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn current(&self) -> Option<Arc<ReadyState>> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn install(&self, state: ReadyState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(state));
    }

    /// Why persisted artifacts cannot be trusted, if they cannot.
    fn staleness(
        &self,
        docs: &[String],
        tokens: &[Vec<String>],
        keyword_docs: usize,
        meta: Option<&IndexMeta>,
        dense: Option<&FlatIpIndex>,
    ) -> Option<String> {
        let dense = dense?;
        if dense.dimension() != self.embedder.dimension() {
            return Some(format!(
                "dense dimension {} differs from model dimension {}",
                dense.dimension(),
                self.embedder.dimension()
            ));
        }
        let Some(meta) = meta else {
            return Some("metadata missing".to_string());
        };
        if meta.version != self.config.version {
            return Some(format!(
                "version {} differs from {}",
                meta.version, self.config.version
            ));
        }
        if meta.checksum != corpus_checksum(docs) {
            return Some("corpus checksum mismatch".to_string());
        }
        if dense.len() != docs.len() || tokens.len() != docs.len() || keyword_docs != docs.len() {
            return Some("artifact lengths disagree with the corpus".to_string());
        }
        None
    }

    async fn rebuild_from(&self, docs: Vec<String>) -> Result<()> {
        if docs.is_empty() {
            let fuzzy = self.open_or_build_fuzzy(Arc::new(Vec::new())).await?;
            self.install(ReadyState {
                docs: Arc::new(Vec::new()),
                dense: Arc::new(FlatIpIndex::new(self.embedder.dimension())),
                keyword: Arc::new(KeywordIndex::build_with_params::<String>(
                    &[],
                    self.config.bm25_params(),
                )),
                fuzzy,
            });
            return Ok(());
        }
        let dense = self.embed_documents(&docs).await?;
        let state = self.materialize(docs, dense).await?;
        self.install(state);
        Ok(())
    }

    async fn embed_documents(&self, docs: &[String]) -> Result<FlatIpIndex> {
        let mut matrix: Option<EmbeddingMatrix> = None;
        for chunk in docs.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<&str> = chunk.iter().map(String::as_str).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;
            if vectors.len() != texts.len() {
                return Err(Error::operation(format!(
                    "Embedding provider returned {} vectors for {} documents",
                    vectors.len(),
                    texts.len()
                )));
            }
            for mut vector in vectors {
                l2_normalize(&mut vector);
                matrix
                    .get_or_insert_with(|| EmbeddingMatrix::new(vector.len()))
                    .push(&vector)?;
            }
        }

        matrix
            .map(FlatIpIndex::from_matrix)
            .ok_or_else(|| Error::build_input("No documents to embed"))
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let key = cache_key(query);
        if let (Some(cache), Some(key)) = (&self.cache, key)
            && let Some(vector) = cache.get(key).await
        {
            return Ok(vector);
        }

        let mut vector = self.embedder.embed(key.unwrap_or(query)).await?;
        l2_normalize(&mut vector);

        if let (Some(cache), Some(key)) = (&self.cache, key) {
            cache.set(key, &vector).await;
        }
        Ok(vector)
    }

    /// Build lexical and fuzzy structures next to `dense` and persist all.
    async fn materialize(&self, docs: Vec<String>, dense: FlatIpIndex) -> Result<ReadyState> {
        let keyword = KeywordIndex::build_with_params(&docs, self.config.bm25_params());
        let docs = Arc::new(docs);
        let fuzzy = build_fuzzy(docs.clone(), &self.paths.fuzzy_dir, &self.config).await?;

        self.persist(&docs, &dense, &keyword)?;

        Ok(ReadyState {
            docs,
            dense: Arc::new(dense),
            keyword: Arc::new(keyword),
            fuzzy,
        })
    }

    /// Write every artifact; metadata goes last so a partial write reads as stale.
    fn persist(&self, docs: &[String], dense: &FlatIpIndex, keyword: &KeywordIndex) -> Result<()> {
        dense.save(&self.paths.dense)?;
        if self.config.persist_embeddings {
            dense.matrix().save(&self.paths.embeddings)?;
        }
        save_docs(&self.paths.docs, docs)?;
        save_tokens(&self.paths.tokens, keyword.tokenized_docs())?;
        save_keywords(&self.paths.keywords, &keyword.to_persisted())?;

        let meta = IndexMeta {
            document_count: Some(docs.len()),
            embedding_dimension: Some(dense.dimension()),
            model: Some(self.embedder.name().to_string()),
            built_at: Some(chrono::Utc::now().to_rfc3339()),
            ..IndexMeta::new(&self.config.version, corpus_checksum(docs))
        };
        save_meta(&self.paths.meta, &meta)?;
        log::debug!("Persisted index metadata to {}", self.paths.meta.display());
        Ok(())
    }

    async fn open_or_build_fuzzy(&self, docs: Arc<Vec<String>>) -> Result<FuzzyIndex> {
        let dir = &self.paths.fuzzy_dir;
        if FuzzyIndex::exists(dir) {
            match FuzzyIndex::open(dir, self.config.fuzzy_options()) {
                Ok(fuzzy) if fuzzy.num_docs() as usize == docs.len() => return Ok(fuzzy),
                Ok(_) => log::warn!("Fuzzy index document count is stale; rebuilding"),
                Err(e) => log::warn!("Fuzzy index unreadable ({e}); rebuilding"),
            }
        }
        build_fuzzy(docs, dir, &self.config).await
    }
}

impl std::fmt::Debug for HybridIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridIndex")
            .field("paths", &self.paths)
            .field("model", &self.embedder.name())
            .field("ready", &self.is_ready())
            .finish()
    }
}

async fn build_fuzzy(
    docs: Arc<Vec<String>>,
    dir: &Path,
    config: &HybridConfig,
) -> Result<FuzzyIndex> {
    let dir = dir.to_path_buf();
    let options = config.fuzzy_options();
    tokio::task::spawn_blocking(move || FuzzyIndex::build(docs.as_slice(), &dir, options))
        .await
        .map_err(|e| Error::operation(format!("spawn_blocking failed: {e}")))?
}

fn missing(artifact: &str, source: Error) -> Error {
    if source.is_missing_index() {
        return source;
    }
    Error::persistence_missing(format!("Cannot read persisted {artifact}: {source}"))
}

// ============================================================================
// Tests
// ============================================================================
