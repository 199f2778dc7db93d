//! Dense retrieval infrastructure for CodeQA.
//!
//! This crate turns text into unit-normalized vectors and searches them
//! exactly by inner product. It includes a fastembed provider
//! (feature-gated), a primary/fallback model strategy, and pluggable
//! query embedding caches.
//!
//! # Features
//!
//! - `vector-fastembed`: Enable local embedding generation via fastembed
//! - `cache-redis`: Enable the Redis-backed query embedding cache
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     codeqa-vector                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  EmbeddingProvider trait                                    │
//! │  ├── MockEmbeddingProvider (always available)               │
//! │  ├── FastEmbedProvider (feature: vector-fastembed)          │
//! │  └── FallbackEmbedder (primary/fallback model strategy)     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ModelLoader trait                                          │
//! │  └── FastEmbedLoader (dependency checks + construction)     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  FlatIpIndex (exact inner-product search)                   │
//! │  EmbeddingMatrix (checksummed binary codec)                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  QueryEmbeddingCache trait                                  │
//! │  ├── LruEmbeddingCache (bounded, in-process)                │
//! │  └── RedisEmbeddingCache (feature: cache-redis)             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use codeqa_vector::{EmbeddingProvider, FlatIpIndex, MockEmbeddingProvider};
//!
//! let provider = MockEmbeddingProvider::new(8);
//! let vectors = provider.embed_batch(&["alpha", "beta"]).await?;
//! let index = FlatIpIndex::from_vectors(8, vectors)?;
//!
//! let query = provider.embed("alpha").await?;
//! let hits = index.search(&query, 1)?;
//! assert_eq!(hits[0].0, 0);
//! ```

pub mod cache;
pub mod embedding;
pub mod fallback;
pub mod flat;
pub mod loader;
pub mod types;

#[cfg(feature = "vector-fastembed")]
pub mod fastembed;

#[cfg(feature = "cache-redis")]
pub mod redis_cache;

// Re-exports: core types
pub use types::{CacheConfig, EmbeddingConfig};

// Re-exports: embedding
pub use embedding::{EmbeddingProvider, MockEmbeddingProvider, l2_normalize};
pub use fallback::{FallbackEmbedder, ModelStrategy};
pub use loader::{FastEmbedLoader, ModelLoader, ModelOptions, is_nomic_model};

// Re-exports: dense index
pub use flat::{EmbeddingMatrix, FlatIpIndex};

// Re-exports: caches
pub use cache::{LruEmbeddingCache, QueryEmbeddingCache, create_query_cache};

// Feature-gated re-exports
#[cfg(feature = "vector-fastembed")]
pub use fastembed::FastEmbedProvider;

#[cfg(feature = "cache-redis")]
pub use redis_cache::RedisEmbeddingCache;
