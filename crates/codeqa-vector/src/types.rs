//! Configuration types for embedding and query caching.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ============================================================================
// Embedding configuration
// ============================================================================

/// Embedding provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: "fastembed" or "mock".
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Primary embedding model name.
    #[serde(default = "default_model")]
    pub model: String,

    /// Model used when the primary cannot be constructed. Empty disables it.
    #[serde(default = "default_fallback_model")]
    pub fallback_model: String,

    /// Extra model construction options (e.g. `trust_remote_code`, `max_length`).
    #[serde(default)]
    pub model_kwargs: serde_json::Map<String, serde_json::Value>,

    /// Directory for downloaded model files.
    pub cache_dir: Option<PathBuf>,

    /// Vector dimension of the mock provider.
    #[serde(default = "default_mock_dimension")]
    pub mock_dimension: usize,
}

fn default_provider() -> String {
    "fastembed".to_string()
}

fn default_model() -> String {
    "nomic-ai/nomic-embed-text-v1.5".to_string()
}

fn default_fallback_model() -> String {
    "all-minilm-l6-v2".to_string()
}

fn default_mock_dimension() -> usize {
    384
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            fallback_model: default_fallback_model(),
            model_kwargs: serde_json::Map::new(),
            cache_dir: None,
            mock_dimension: default_mock_dimension(),
        }
    }
}

impl EmbeddingConfig {
    /// The fallback model, if one is configured.
    pub fn fallback(&self) -> Option<&str> {
        let name = self.fallback_model.trim();
        (!name.is_empty()).then_some(name)
    }
}

// ============================================================================
// Cache configuration
// ============================================================================

/// Query embedding cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache backend: "memory" or "redis".
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Capacity of the in-process cache.
    #[serde(default = "default_max_size")]
    pub max_size: usize,

    /// Connection URL of the Redis backend.
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Key prefix of the Redis backend.
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_backend() -> String {
    "memory".to_string()
}

fn default_max_size() -> usize {
    512
}

fn default_redis_url() -> String {
    "redis://localhost:6379/0".to_string()
}

fn default_namespace() -> String {
    "rag:embeddings".to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            max_size: default_max_size(),
            redis_url: default_redis_url(),
            namespace: default_namespace(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_config_defaults() {
        let config = EmbeddingConfig::default();
        assert_eq!(config.provider, "fastembed");
        assert_eq!(config.model, "nomic-ai/nomic-embed-text-v1.5");
        assert_eq!(config.fallback(), Some("all-minilm-l6-v2"));
        assert!(config.model_kwargs.is_empty());
        assert_eq!(config.mock_dimension, 384);
    }

    #[test]
    fn test_embedding_config_empty_fallback() {
        let config: EmbeddingConfig =
            serde_json::from_str(r#"{"model": "bge-small-en-v1.5", "fallback_model": " "}"#)
                .unwrap();
        assert_eq!(config.model, "bge-small-en-v1.5");
        assert_eq!(config.fallback(), None);
    }

    #[test]
    fn test_cache_config_defaults() {
        let config: CacheConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, CacheConfig::default());
        assert_eq!(config.backend, "memory");
        assert_eq!(config.max_size, 512);
        assert_eq!(config.redis_url, "redis://localhost:6379/0");
        assert_eq!(config.namespace, "rag:embeddings");
    }
}
