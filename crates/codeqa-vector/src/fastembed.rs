//! FastEmbed embedding provider.
//!
//! Wraps the `fastembed` crate to provide local embedding generation
//! via pre-trained ONNX models (nomic, BGE, MiniLM).
//!
//! # Thread Safety
//!
//! `fastembed::TextEmbedding` needs `&mut self` to embed, so we wrap it in
//! `Arc<Mutex<>>` and use `tokio::task::spawn_blocking` for embedding calls.
//!
//! # Feature Gate
//!
//! This module requires the `vector-fastembed` feature.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use codeqa_core::{Error, Result};

use crate::embedding::EmbeddingProvider;
use crate::loader::ModelOptions;

/// Map a model name string to a fastembed `EmbeddingModel` enum variant.
fn resolve_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "nomic-ai/nomic-embed-text-v1.5" | "nomic-embed-text-v1.5" | "NomicEmbedTextV15" => {
            Ok(fastembed::EmbeddingModel::NomicEmbedTextV15)
        }
        "nomic-ai/nomic-embed-text-v1" | "nomic-embed-text-v1" | "NomicEmbedTextV1" => {
            Ok(fastembed::EmbeddingModel::NomicEmbedTextV1)
        }
        "all-minilm-l6-v2"
        | "sentence-transformers/all-MiniLM-L6-v2"
        | "AllMiniLML6V2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" | "BAAI/bge-small-en-v1.5" | "BGESmallENV15" => {
            Ok(fastembed::EmbeddingModel::BGESmallENV15)
        }
        "bge-base-en-v1.5" | "BAAI/bge-base-en-v1.5" | "BGEBaseENV15" => {
            Ok(fastembed::EmbeddingModel::BGEBaseENV15)
        }
        other => Err(Error::config(format!(
            "Unknown embedding model: '{other}'. Supported: nomic-ai/nomic-embed-text-v1.5, \
             nomic-ai/nomic-embed-text-v1, all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5"
        ))),
    }
}

/// FastEmbed-based embedding provider.
///
/// The model is loaded once and reused for all subsequent calls.
///
/// # Supported Models
///
/// | Name | Dimension |
/// |------|-----------|
/// | `nomic-ai/nomic-embed-text-v1.5` | 768 |
/// | `nomic-ai/nomic-embed-text-v1` | 768 |
/// | `all-minilm-l6-v2` | 384 |
/// | `bge-small-en-v1.5` | 384 |
/// | `bge-base-en-v1.5` | 768 |
pub struct FastEmbedProvider {
    model: Arc<Mutex<fastembed::TextEmbedding>>,
    dimension: usize,
    model_name: String,
}

impl FastEmbedProvider {
    /// Create a provider with default options.
    pub fn new(model_name: &str) -> Result<Self> {
        Self::with_options(model_name, &ModelOptions::default())
    }

    /// Create a provider, downloading the model if not cached locally.
    ///
    /// Recognized options: `cache_dir`, and `max_length` /
    /// `show_download_progress` in the kwargs.
    pub fn with_options(model_name: &str, options: &ModelOptions) -> Result<Self> {
        let model_enum = resolve_model(model_name)?;

        let mut init = fastembed::InitOptions::new(model_enum)
            .with_show_download_progress(options.flag("show_download_progress").unwrap_or(false));
        if let Some(dir) = &options.cache_dir {
            init = init.with_cache_dir(dir.clone());
        }
        if let Some(max_length) = options.usize_option("max_length") {
            init = init.with_max_length(max_length);
        }

        let mut text_embedding = fastembed::TextEmbedding::try_new(init)
            .map_err(|e| Error::operation(format!("Failed to initialize fastembed model: {e}")))?;

        // Measure dimension via a test embedding
        let sample = text_embedding
            .embed(vec!["dimension check"], None)
            .map_err(|e| Error::operation(format!("Failed to measure embedding dimension: {e}")))?;

        let dimension = sample
            .first()
            .map(|v| v.len())
            .ok_or_else(|| Error::operation("Empty sample embedding"))?;

        log::info!("Loaded embedding model {model_name} (dimension {dimension})");

        Ok(Self {
            model: Arc::new(Mutex::new(text_embedding)),
            dimension,
            model_name: model_name.to_string(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut batch = self.embed_batch(&[text]).await?;
        batch
            .pop()
            .ok_or_else(|| Error::operation("No embedding returned"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let model = self.model.clone();
        let texts: Vec<String> = texts.iter().map(|t| t.to_string()).collect();

        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|e| Error::operation(format!("Mutex poisoned: {e}")))?;
            model
                .embed(texts, None)
                .map_err(|e| Error::operation(format!("Batch embedding failed: {e}")))
        })
        .await
        .map_err(|e| Error::operation(format!("spawn_blocking failed: {e}")))?
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("model", &self.model_name)
            .field("dimension", &self.dimension)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
