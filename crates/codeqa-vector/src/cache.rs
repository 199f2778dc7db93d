//! Query embedding caches.
//!
//! Keys are the trimmed query text; blank queries are never cached. Cached
//! vectors survive corpus rebuilds: the same query text embeds to the same
//! vector whatever the corpus.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use codeqa_core::{Error, Result};
use lru::LruCache;

use crate::types::CacheConfig;

/// Memoizes query embeddings.
///
/// Lookups never fail: a backend error reads as a miss and a failed write
/// is dropped.
#[async_trait]
pub trait QueryEmbeddingCache: Send + Sync {
    /// The cached vector for `query`, if any.
    async fn get(&self, query: &str) -> Option<Vec<f32>>;

    /// Cache `embedding` for `query`.
    async fn set(&self, query: &str, embedding: &[f32]);
}

/// The cache key for `query`, or `None` if it is blank.
pub fn cache_key(query: &str) -> Option<&str> {
    let key = query.trim();
    (!key.is_empty()).then_some(key)
}

// ============================================================================
// LruEmbeddingCache
// ============================================================================

/// Bounded in-process cache with least-recently-used eviction.
pub struct LruEmbeddingCache {
    entries: Mutex<LruCache<String, Vec<f32>>>,
}

impl LruEmbeddingCache {
    /// Create a cache holding at most `max_size` entries (minimum 1).
    pub fn new(max_size: usize) -> Self {
        let capacity = NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of cached queries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, Vec<f32>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for LruEmbeddingCache {
    fn default() -> Self {
        Self::new(CacheConfig::default().max_size)
    }
}

#[async_trait]
impl QueryEmbeddingCache for LruEmbeddingCache {
    async fn get(&self, query: &str) -> Option<Vec<f32>> {
        let key = cache_key(query)?;
        self.lock().get(key).cloned()
    }

    async fn set(&self, query: &str, embedding: &[f32]) {
        if let Some(key) = cache_key(query) {
            self.lock().put(key.to_string(), embedding.to_vec());
        }
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Create the cache selected by `config.backend`.
pub async fn create_query_cache(config: &CacheConfig) -> Result<Arc<dyn QueryEmbeddingCache>> {
    match config.backend.to_lowercase().as_str() {
        "memory" => {
            log::debug!("Using in-process query cache (max {})", config.max_size);
            Ok(Arc::new(LruEmbeddingCache::new(config.max_size)))
        }
        "redis" => redis_cache(config).await,
        other => Err(Error::config(format!(
            "Unknown cache backend: '{other}'. Supported: memory, redis"
        ))),
    }
}

#[cfg(feature = "cache-redis")]
async fn redis_cache(config: &CacheConfig) -> Result<Arc<dyn QueryEmbeddingCache>> {
    let cache =
        crate::redis_cache::RedisEmbeddingCache::connect(&config.redis_url, &config.namespace)
            .await?;
    Ok(Arc::new(cache))
}

#[cfg(not(feature = "cache-redis"))]
async fn redis_cache(_config: &CacheConfig) -> Result<Arc<dyn QueryEmbeddingCache>> {
    Err(Error::dependency_missing(
        "redis",
        "cache.backend = \"redis\" needs the `cache-redis` feature; rebuild with it or use \"memory\"",
    ))
}

// ============================================================================
// Tests
// ============================================================================
