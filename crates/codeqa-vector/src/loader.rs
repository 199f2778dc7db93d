//! Embedding model construction.
//!
//! A [`ModelLoader`] turns a model name plus construction options into a
//! ready [`EmbeddingProvider`]. Loading is blocking (it may download
//! weights), so async callers run it on the blocking pool.

use std::path::PathBuf;
use std::sync::Arc;

use codeqa_core::{Error, Result};
use serde_json::{Map, Value};

use crate::embedding::EmbeddingProvider;

/// Whether `model` belongs to the nomic embedding family.
pub fn is_nomic_model(model: &str) -> bool {
    model.to_lowercase().contains("nomic")
}

// ============================================================================
// Model options
// ============================================================================

/// Construction options for one model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelOptions {
    /// Free-form construction options.
    pub kwargs: Map<String, Value>,

    /// Directory for downloaded model files.
    pub cache_dir: Option<PathBuf>,
}

impl ModelOptions {
    /// Options for `model`, starting from the caller's `kwargs`.
    ///
    /// Nomic models get `trust_remote_code = true` unless the caller set it.
    pub fn for_model(model: &str, kwargs: &Map<String, Value>) -> Self {
        let mut kwargs = kwargs.clone();
        if is_nomic_model(model) && !kwargs.contains_key("trust_remote_code") {
            kwargs.insert("trust_remote_code".to_string(), Value::Bool(true));
        }
        Self {
            kwargs,
            cache_dir: None,
        }
    }

    /// Set the model file cache directory.
    pub fn with_cache_dir(mut self, cache_dir: Option<PathBuf>) -> Self {
        self.cache_dir = cache_dir;
        self
    }

    /// Boolean option `key`, if present and boolean.
    pub fn flag(&self, key: &str) -> Option<bool> {
        self.kwargs.get(key).and_then(Value::as_bool)
    }

    /// Unsigned integer option `key`, if present and numeric.
    pub fn usize_option(&self, key: &str) -> Option<usize> {
        self.kwargs
            .get(key)
            .and_then(Value::as_u64)
            .map(|v| v as usize)
    }
}

// ============================================================================
// Loader trait
// ============================================================================

/// Constructs embedding providers by model name.
pub trait ModelLoader: Send + Sync {
    /// Verify that everything `model` needs at runtime is present.
    ///
    /// Fails with [`Error::DependencyMissing`] carrying a remediation hint.
    fn check_dependencies(&self, model: &str) -> Result<()>;

    /// Construct the provider for `model`.
    fn load(&self, model: &str, options: &ModelOptions) -> Result<Arc<dyn EmbeddingProvider>>;
}

/// Loader backed by fastembed.
///
/// Without the `vector-fastembed` feature no model can be constructed, and
/// the nomic family reports the missing backend up front.
#[derive(Debug, Clone, Default)]
pub struct FastEmbedLoader;

impl FastEmbedLoader {
    /// Create a new loader.
    pub fn new() -> Self {
        Self
    }
}

impl ModelLoader for FastEmbedLoader {
    fn check_dependencies(&self, model: &str) -> Result<()> {
        if is_nomic_model(model) && !cfg!(feature = "vector-fastembed") {
            return Err(Error::dependency_missing(
                "fastembed",
                format!(
                    "model '{model}' needs the fastembed backend; rebuild with the \
                     `vector-fastembed` feature or configure a different embedding model"
                ),
            ));
        }
        Ok(())
    }

    #[cfg(feature = "vector-fastembed")]
    fn load(&self, model: &str, options: &ModelOptions) -> Result<Arc<dyn EmbeddingProvider>> {
        if is_nomic_model(model) && options.flag("trust_remote_code") == Some(false) {
            return Err(Error::operation(format!(
                "model '{model}' requires trust_remote_code"
            )));
        }
        let provider = crate::fastembed::FastEmbedProvider::with_options(model, options)?;
        Ok(Arc::new(provider))
    }

    #[cfg(not(feature = "vector-fastembed"))]
    fn load(&self, model: &str, _options: &ModelOptions) -> Result<Arc<dyn EmbeddingProvider>> {
        Err(Error::operation(format!(
            "cannot load '{model}': built without the `vector-fastembed` feature"
        )))
    }
}

// ============================================================================
// Tests
// ============================================================================
