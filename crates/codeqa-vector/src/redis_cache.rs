//! Redis-backed query embedding cache.
//!
//! Vectors are stored as JSON arrays under `{namespace}:{trimmed query}` so
//! other services can read them. Undecodable values read as a miss.
//!
//! # Feature Gate
//!
//! This module requires the `cache-redis` feature.

use async_trait::async_trait;
use codeqa_core::{Error, Result};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use crate::cache::{QueryEmbeddingCache, cache_key};

/// Query embedding cache stored in Redis.
#[derive(Clone)]
pub struct RedisEmbeddingCache {
    conn: ConnectionManager,
    namespace: String,
}

impl RedisEmbeddingCache {
    /// Connect to `url` and store keys under `namespace`.
    pub async fn connect(url: &str, namespace: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| Error::config(format!("Invalid Redis URL '{url}': {e}")))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| Error::operation(format!("Failed to connect to Redis at {url}: {e}")))?;
        log::info!("Using Redis query cache at {url} (namespace {namespace})");
        Ok(Self {
            conn,
            namespace: namespace.to_string(),
        })
    }

    fn key(&self, query: &str) -> Option<String> {
        namespaced_key(&self.namespace, query)
    }
}

fn namespaced_key(namespace: &str, query: &str) -> Option<String> {
    cache_key(query).map(|key| format!("{namespace}:{key}"))
}

fn decode(raw: &str) -> Option<Vec<f32>> {
    serde_json::from_str(raw).ok()
}

#[async_trait]
impl QueryEmbeddingCache for RedisEmbeddingCache {
    async fn get(&self, query: &str) -> Option<Vec<f32>> {
        let key = self.key(query)?;
        let mut conn = self.conn.clone();
        let raw: Option<String> = match conn.get(&key).await {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("Redis cache read failed: {e}");
                return None;
            }
        };
        raw.as_deref().and_then(decode)
    }

    async fn set(&self, query: &str, embedding: &[f32]) {
        let Some(key) = self.key(query) else {
            return;
        };
        let payload = match serde_json::to_string(embedding) {
            Ok(payload) => payload,
            Err(e) => {
                log::warn!("Failed to encode embedding for cache: {e}");
                return;
            }
        };
        let mut conn = self.conn.clone();
        let written: redis::RedisResult<()> = conn.set(&key, payload).await;
        if let Err(e) = written {
            log::warn!("Redis cache write failed: {e}");
        }
    }
}

impl std::fmt::Debug for RedisEmbeddingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisEmbeddingCache")
            .field("namespace", &self.namespace)
            .finish()
    }
}
