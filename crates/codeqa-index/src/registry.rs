//! Lazily loaded indices, cached by id.
//!
//! The registry is an explicit object owned by the serving layer. Lookups
//! load on first use through an [`IndexFactory`]; [`IndexRegistry::evict`]
//! drops a cached handle so the next lookup reloads from disk.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use codeqa_core::Result;
use codeqa_vector::{EmbeddingProvider, QueryEmbeddingCache};

use crate::config::{HybridConfig, IndexPaths};
use crate::hybrid::HybridIndex;
use crate::pipeline::{IndexStore, PendingSwap};

/// Opens the index for an id.
#[async_trait]
pub trait IndexFactory: Send + Sync {
    /// Construct and load index `id`.
    async fn open(&self, id: &str) -> Result<HybridIndex>;
}

/// Opens indices from the serving directories of an [`IndexStore`].
pub struct StoreFactory {
    store: Arc<IndexStore>,
    config: HybridConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    cache: Option<Arc<dyn QueryEmbeddingCache>>,
}

impl StoreFactory {
    /// A factory sharing `embedder` across every index it opens.
    pub fn new(
        store: Arc<IndexStore>,
        config: HybridConfig,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            store,
            config,
            embedder,
            cache: None,
        }
    }

    /// The store this factory reads from.
    pub fn store(&self) -> &Arc<IndexStore> {
        &self.store
    }

    /// Share `cache` across every index it opens.
    pub fn with_cache(mut self, cache: Arc<dyn QueryEmbeddingCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// An unloaded index for the serving directory of `id`.
    pub fn index(&self, id: &str) -> HybridIndex {
        self.index_at(self.store.paths(id))
    }

    /// An unloaded index persisting to `paths`.
    pub fn index_at(&self, paths: IndexPaths) -> HybridIndex {
        let index = HybridIndex::new(self.config.clone(), paths, self.embedder.clone());
        match &self.cache {
            Some(cache) => index.with_cache(cache.clone()),
            None => index,
        }
    }
}

#[async_trait]
impl IndexFactory for StoreFactory {
    async fn open(&self, id: &str) -> Result<HybridIndex> {
        let index = self.index(id);
        index.load().await?;
        Ok(index)
    }
}

// ============================================================================
// IndexRegistry
// ============================================================================

/// Cache of loaded indices keyed by id.
pub struct IndexRegistry {
    factory: Arc<dyn IndexFactory>,
    entries: RwLock<HashMap<String, Arc<HybridIndex>>>,
    loading: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl IndexRegistry {
    /// An empty registry loading through `factory`.
    pub fn new(factory: Arc<dyn IndexFactory>) -> Self {
        Self {
            factory,
            entries: RwLock::new(HashMap::new()),
            loading: Mutex::new(HashMap::new()),
        }
    }

    /// The cached index for `id`, loading it on first use.
    ///
    /// Concurrent first lookups of one id load it once.
    pub async fn get_or_load(&self, id: &str) -> Result<Arc<HybridIndex>> {
        if let Some(index) = self.get(id) {
            return Ok(index);
        }

        let gate = self
            .loading
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id.to_string())
            .or_default()
            .clone();
        let _guard = gate.lock().await;

        if let Some(index) = self.get(id) {
            return Ok(index);
        }

        log::debug!("Loading index '{id}'");
        let index = Arc::new(self.factory.open(id).await?);
        self.put(id, index.clone());
        Ok(index)
    }

    /// The cached index for `id`, without loading.
    pub fn get(&self, id: &str) -> Option<Arc<HybridIndex>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Cache `index` under `id`, replacing any previous handle.
    pub fn put(&self, id: &str, index: Arc<HybridIndex>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), index);
    }

    /// Drop the cached handle for `id`.
    pub fn evict(&self, id: &str) -> Option<Arc<HybridIndex>> {
        let evicted = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        if evicted.is_some() {
            log::debug!("Evicted index '{id}'");
        }
        evicted
    }

    /// Commit `swap` and serve its index for `id` without a reload.
    pub fn commit(&self, id: &str, swap: PendingSwap) -> Result<Arc<HybridIndex>> {
        self.evict(id);
        let index = Arc::new(swap.commit()?);
        self.put(id, index.clone());
        Ok(index)
    }

    /// Ids with a cached handle, sorted.
    pub fn loaded_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

impl std::fmt::Debug for IndexRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexRegistry")
            .field("loaded", &self.loaded_ids())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::BuildRequest;
    use codeqa_core::Error;
    use codeqa_vector::MockEmbeddingProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct CountingFactory {
        inner: StoreFactory,
        opens: AtomicUsize,
    }

    #[async_trait]
    impl IndexFactory for CountingFactory {
        async fn open(&self, id: &str) -> Result<HybridIndex> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            self.inner.open(id).await
        }
    }

    async fn setup(dir: &std::path::Path) -> (Arc<IndexStore>, Arc<CountingFactory>) {
        let store = Arc::new(IndexStore::new(dir));
        let factory = StoreFactory::new(
            store.clone(),
            HybridConfig::default(),
            Arc::new(MockEmbeddingProvider::new(16)),
        );
        let swap = store
            .rebuild(BuildRequest::new("docs"), |paths| async move {
                let index = factory_index(paths);
                index.build(vec!["alpha beta".into(), "gamma".into()]).await?;
                Ok::<_, Error>(index)
            })
            .await
            .unwrap();
        swap.commit().unwrap();

        let counting = Arc::new(CountingFactory {
            inner: factory,
            opens: AtomicUsize::new(0),
        });
        (store, counting)
    }

    fn factory_index(paths: crate::IndexPaths) -> HybridIndex {
        HybridIndex::new(
            HybridConfig::default(),
            paths,
            Arc::new(MockEmbeddingProvider::new(16)),
        )
    }

    #[tokio::test]
    async fn test_get_or_load_caches() {
        let dir = tempdir().unwrap();
        let (_store, factory) = setup(dir.path()).await;
        let registry = IndexRegistry::new(factory.clone());

        let first = registry.get_or_load("docs").await.unwrap();
        let second = registry.get_or_load("docs").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.opens.load(Ordering::SeqCst), 1);
        assert_eq!(registry.loaded_ids(), vec!["docs"]);
    }

    #[tokio::test]
    async fn test_evict_forces_reload() {
        let dir = tempdir().unwrap();
        let (_store, factory) = setup(dir.path()).await;
        let registry = IndexRegistry::new(factory.clone());

        registry.get_or_load("docs").await.unwrap();
        assert!(registry.evict("docs").is_some());
        assert!(registry.get("docs").is_none());
        registry.get_or_load("docs").await.unwrap();
        assert_eq!(factory.opens.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_index_is_not_cached() {
        let dir = tempdir().unwrap();
        let (_store, factory) = setup(dir.path()).await;
        let registry = IndexRegistry::new(factory);

        let err = registry.get_or_load("absent").await.unwrap_err();
        assert!(matches!(err, Error::PersistenceMissing(_)));
        assert!(registry.get("absent").is_none());
    }

    #[tokio::test]
    async fn test_commit_warms_cache() {
        let dir = tempdir().unwrap();
        let (store, factory) = setup(dir.path()).await;
        let registry = IndexRegistry::new(factory.clone());
        let stale = registry.get_or_load("docs").await.unwrap();

        let swap = store
            .rebuild(BuildRequest::new("docs").with_force(true), |paths| async move {
                let index = factory_index(paths);
                index.build(vec!["delta".into()]).await?;
                Ok::<_, Error>(index)
            })
            .await
            .unwrap();
        let fresh = registry.commit("docs", swap).unwrap();

        assert!(!Arc::ptr_eq(&stale, &fresh));
        let cached = registry.get_or_load("docs").await.unwrap();
        assert!(Arc::ptr_eq(&fresh, &cached));
        assert_eq!(cached.status().document_count, 1);
        assert_eq!(factory.opens.load(Ordering::SeqCst), 1);
    }
}
