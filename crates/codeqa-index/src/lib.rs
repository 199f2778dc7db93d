//! Hybrid dense + lexical retrieval index.
//!
//! This crate ties the engines of the workspace together:
//!
//! - [`HybridIndex`]: build, load (with staleness detection and self-healing
//!   rebuilds) and search with weighted reciprocal rank fusion
//! - [`fusion`]: keyword-hit merging and weighted RRF
//! - [`IndexStore`]: durable rebuilds into a temp directory with an atomic
//!   directory swap and backup
//! - [`IndexRegistry`]: lazily loaded indices cached by id
//! - [`BuildRunner`]: single-flight background builds with pollable progress
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use codeqa_index::{HybridConfig, HybridIndex, IndexPaths};
//! use codeqa_vector::MockEmbeddingProvider;
//!
//! let index = HybridIndex::new(
//!     HybridConfig::default(),
//!     IndexPaths::in_dir("/var/lib/codeqa/handbook"),
//!     Arc::new(MockEmbeddingProvider::new(384)),
//! );
//! index.build(vec!["fn main() {}".into(), "struct Config;".into()]).await?;
//! let hits = index.search("config struct", 5, 0.5).await?;
//! ```

pub mod config;
pub mod fusion;
pub mod hybrid;
pub mod persistence;
pub mod pipeline;
pub mod registry;
pub mod runner;

pub use config::{HybridConfig, IndexPaths};
pub use fusion::{Hit, merge_keyword_hits, weighted_rrf};
pub use hybrid::{HybridIndex, IndexStatus, ScoredDocument};
pub use persistence::{Freshness, IndexMeta, check_freshness, corpus_checksum};
pub use pipeline::{BuildRequest, IndexStore, PendingSwap, SourceMetadata};
pub use registry::{IndexFactory, IndexRegistry, StoreFactory};
pub use runner::{BuildProgress, BuildRunner, BuildState};
