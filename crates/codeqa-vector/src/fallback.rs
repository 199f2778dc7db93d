//! Primary/fallback embedding model strategy.
//!
//! [`ModelStrategy`] names a primary model and an optional fallback.
//! [`FallbackEmbedder`] evaluates it twice:
//!
//! - at construction, the fallback is loaded only if the primary cannot be;
//! - at embed time, a failed call is retried exactly once on the fallback.
//!
//! A missing runtime dependency of the primary is reported immediately and
//! is never masked by the fallback.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use codeqa_core::{Error, Result};
use serde_json::{Map, Value};
use tokio::sync::OnceCell;

use crate::embedding::{EmbeddingProvider, l2_normalize};
use crate::loader::{ModelLoader, ModelOptions};
use crate::types::EmbeddingConfig;

// ============================================================================
// Strategy
// ============================================================================

/// A primary model and an optional fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelStrategy {
    /// Model tried first.
    pub primary: String,
    /// Model tried once if the primary fails.
    pub fallback: Option<String>,
}

impl ModelStrategy {
    /// Strategy with no fallback.
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            fallback: None,
        }
    }

    /// Set the fallback model.
    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        let fallback = fallback.into();
        self.fallback = (!fallback.trim().is_empty()).then_some(fallback);
        self
    }

    /// Strategy described by an embedding configuration.
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            primary: config.model.clone(),
            fallback: config
                .fallback()
                .filter(|f| *f != config.model)
                .map(str::to_string),
        }
    }

    /// Run `attempt` on the primary model, then once on the fallback.
    ///
    /// Returns the model that succeeded with its value. A
    /// [`Error::DependencyMissing`] from the primary is returned as is.
    pub fn attempt<T>(&self, mut attempt: impl FnMut(&str) -> Result<T>) -> Result<(String, T)> {
        let primary_err = match attempt(&self.primary) {
            Ok(value) => return Ok((self.primary.clone(), value)),
            Err(e @ Error::DependencyMissing { .. }) => return Err(e),
            Err(e) => e,
        };

        let Some(fallback) = &self.fallback else {
            return Err(Error::model_unavailable(format!(
                "{}: {primary_err}",
                self.primary
            )));
        };

        log::warn!(
            "Embedding model {} failed ({primary_err}), trying fallback {fallback}",
            self.primary
        );
        match attempt(fallback) {
            Ok(value) => Ok((fallback.clone(), value)),
            Err(fallback_err) => Err(Error::model_unavailable(format!(
                "{}: {primary_err}; fallback {fallback}: {fallback_err}",
                self.primary
            ))),
        }
    }
}

// ============================================================================
// FallbackEmbedder
// ============================================================================

/// Embedding provider that owns a [`ModelStrategy`].
///
/// All vectors it returns are unit length.
pub struct FallbackEmbedder {
    strategy: ModelStrategy,
    kwargs: Map<String, Value>,
    cache_dir: Option<PathBuf>,
    loader: Arc<dyn ModelLoader>,
    active: Arc<dyn EmbeddingProvider>,
    active_model: String,
    retry: OnceCell<Arc<dyn EmbeddingProvider>>,
}

impl FallbackEmbedder {
    /// Construct the active model, falling back if the primary cannot load.
    ///
    /// Blocking: model construction may download weights.
    pub fn new(
        strategy: ModelStrategy,
        kwargs: Map<String, Value>,
        cache_dir: Option<PathBuf>,
        loader: Arc<dyn ModelLoader>,
    ) -> Result<Self> {
        let (active_model, active) = strategy.attempt(|model| {
            loader.check_dependencies(model)?;
            let options = ModelOptions::for_model(model, &kwargs).with_cache_dir(cache_dir.clone());
            loader.load(model, &options)
        })?;

        log::info!(
            "Embedding with {active_model} (dimension {})",
            active.dimension()
        );

        Ok(Self {
            strategy,
            kwargs,
            cache_dir,
            loader,
            active,
            active_model,
            retry: OnceCell::new(),
        })
    }

    /// Construct from an embedding configuration.
    pub fn from_config(config: &EmbeddingConfig, loader: Arc<dyn ModelLoader>) -> Result<Self> {
        Self::new(
            ModelStrategy::from_config(config),
            config.model_kwargs.clone(),
            config.cache_dir.clone(),
            loader,
        )
    }

    /// Name of the model serving embed calls.
    pub fn active_model(&self) -> &str {
        &self.active_model
    }

    /// The configured strategy.
    pub fn strategy(&self) -> &ModelStrategy {
        &self.strategy
    }

    async fn retry_provider(&self) -> Option<&Arc<dyn EmbeddingProvider>> {
        let fallback = self.strategy.fallback.clone()?;
        if fallback == self.active_model {
            return None;
        }

        let loader = self.loader.clone();
        let options =
            ModelOptions::for_model(&fallback, &self.kwargs).with_cache_dir(self.cache_dir.clone());
        let loaded = self
            .retry
            .get_or_try_init(|| async move {
                tokio::task::spawn_blocking(move || {
                    loader.check_dependencies(&fallback)?;
                    loader.load(&fallback, &options)
                })
                .await
                .map_err(|e| Error::operation(format!("spawn_blocking failed: {e}")))?
            })
            .await;

        match loaded {
            Ok(provider) => Some(provider),
            Err(e) => {
                log::warn!("Fallback embedding model unavailable: {e}");
                None
            }
        }
    }
}

fn normalized(mut vectors: Vec<Vec<f32>>, expected: usize) -> Result<Vec<Vec<f32>>> {
    if vectors.len() != expected {
        return Err(Error::operation(format!(
            "Embedding model returned {} vectors for {expected} texts",
            vectors.len()
        )));
    }
    for v in &mut vectors {
        l2_normalize(v);
    }
    Ok(vectors)
}

#[async_trait]
impl EmbeddingProvider for FallbackEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut batch = self.embed_batch(&[text]).await?;
        batch
            .pop()
            .ok_or_else(|| Error::operation("No embedding returned"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let err = match self.active.embed_batch(texts).await {
            Ok(vectors) => return normalized(vectors, texts.len()),
            Err(e) => e,
        };

        let Some(retry) = self.retry_provider().await else {
            return Err(err);
        };
        log::warn!(
            "Embedding with {} failed ({err}), retrying once with {}",
            self.active_model,
            retry.name()
        );
        let vectors = retry.embed_batch(texts).await?;
        normalized(vectors, texts.len())
    }

    fn dimension(&self) -> usize {
        self.active.dimension()
    }

    fn name(&self) -> &str {
        &self.active_model
    }
}

impl std::fmt::Debug for FallbackEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackEmbedder")
            .field("strategy", &self.strategy)
            .field("active_model", &self.active_model)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
