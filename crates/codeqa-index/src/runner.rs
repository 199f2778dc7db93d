//! Background index builds with pollable progress.
//!
//! A [`BuildRunner`] admits one build at a time and tracks it through
//! `idle -> running -> completed | error`. Callers poll
//! [`BuildRunner::progress`] while the build runs as a tokio task.

use std::sync::{Arc, Mutex, PoisonError};

use codeqa_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::pipeline::BuildRequest;
use crate::registry::{IndexRegistry, StoreFactory};

const IDLE_MESSAGE: &str = "No build started.";
const FAILED_MESSAGE: &str = "Failed to build index. See errors for details.";

/// Build lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildState {
    /// No build has started since the last reset.
    Idle,
    /// A build is running.
    Running,
    /// The last build succeeded.
    Completed,
    /// The last build failed.
    Error,
}

/// Snapshot of build progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildProgress {
    /// Lifecycle state.
    pub status: BuildState,
    /// Completion percentage, 0 to 100.
    pub percent: u8,
    /// Human-readable step description.
    pub message: String,
    /// What is being indexed.
    pub root: Option<String>,
    /// Output of the finished build.
    pub output: String,
    /// Error text of a failed build.
    pub errors: String,
}

impl Default for BuildProgress {
    fn default() -> Self {
        Self {
            status: BuildState::Idle,
            percent: 0,
            message: IDLE_MESSAGE.to_string(),
            root: None,
            output: String::new(),
            errors: String::new(),
        }
    }
}

/// Single-flight build tracker. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct BuildRunner {
    progress: Arc<Mutex<BuildProgress>>,
}

impl BuildRunner {
    /// An idle runner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current progress.
    pub fn progress(&self) -> BuildProgress {
        self.lock().clone()
    }

    /// Whether a build is running.
    pub fn is_running(&self) -> bool {
        self.lock().status == BuildState::Running
    }

    /// Enter the running state for a build of `root`.
    ///
    /// Fails with [`Error::BuildInProgress`] if a build is already running.
    pub fn start(&self, root: &str) -> Result<()> {
        let mut progress = self.lock();
        if progress.status == BuildState::Running {
            return Err(Error::build_in_progress("An index build is already running."));
        }
        *progress = BuildProgress {
            status: BuildState::Running,
            percent: 5,
            message: format!("Preparing build from {root}"),
            root: Some(root.to_string()),
            ..BuildProgress::default()
        };
        Ok(())
    }

    /// Report a step; `percent` is clamped to `0..=100`.
    pub fn update(&self, message: impl Into<String>, percent: i32) {
        let mut progress = self.lock();
        progress.message = message.into();
        progress.percent = percent.clamp(0, 100) as u8;
    }

    /// Finish successfully.
    pub fn complete(&self, output: impl Into<String>) {
        let mut progress = self.lock();
        progress.status = BuildState::Completed;
        progress.percent = 100;
        progress.message = "Index built successfully.".to_string();
        progress.output = output.into();
        progress.errors.clear();
    }

    /// Finish with an error.
    pub fn fail(
        &self,
        message: impl Into<String>,
        errors: impl Into<String>,
        output: impl Into<String>,
    ) {
        let mut progress = self.lock();
        progress.status = BuildState::Error;
        progress.message = message.into();
        progress.errors = errors.into();
        progress.output = output.into();
    }

    /// Return to idle.
    pub fn reset(&self) {
        *self.lock() = BuildProgress::default();
    }

    /// Start a build of `docs` and run it as a tokio task.
    ///
    /// Fails immediately if a build is running. The task swaps the new
    /// index into `factory`'s store and, with a registry, serves it from
    /// there without a reload.
    pub fn spawn_build(
        &self,
        factory: Arc<StoreFactory>,
        registry: Option<Arc<IndexRegistry>>,
        request: BuildRequest,
        docs: Vec<String>,
    ) -> Result<JoinHandle<()>> {
        let root = if request.path.is_empty() {
            request.id.clone()
        } else {
            request.path.clone()
        };
        self.start(&root)?;

        let runner = self.clone();
        Ok(tokio::spawn(async move {
            runner
                .execute(&factory, registry.as_deref(), request, docs, &root)
                .await;
        }))
    }

    async fn execute(
        &self,
        factory: &StoreFactory,
        registry: Option<&IndexRegistry>,
        request: BuildRequest,
        docs: Vec<String>,
        root: &str,
    ) {
        self.update(format!("Collecting documents from {root}"), 10);
        if docs.is_empty() {
            self.fail("No documents found, aborting.", "", "");
            return;
        }

        self.update("Configuring index...", 30);
        let store = factory.store();
        if store.exists(&request.id) && !request.force {
            self.fail("Index already exists. Use --force to rebuild.", "", "");
            return;
        }

        self.update("Embedding documents and writing index...", 60);
        let id = request.id.clone();
        let count = docs.len();
        let swapped = store
            .rebuild(request, |paths| async move {
                let index = factory.index_at(paths);
                index.build(docs).await?;
                Ok::<_, Error>(index)
            })
            .await;

        let committed = swapped.and_then(|swap| match registry {
            Some(registry) => registry.commit(&id, swap).map(|_| ()),
            None => swap.commit().map(|_| ()),
        });

        match committed {
            Ok(()) => self.complete(format!(
                "Indexed {count} documents into {}",
                store.serving_dir(&id).display()
            )),
            Err(e) => {
                log::error!("Build of index '{id}' failed: {e}");
                self.fail(FAILED_MESSAGE, e.to_string(), "");
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BuildProgress> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HybridConfig;
    use crate::pipeline::IndexStore;
    use codeqa_vector::MockEmbeddingProvider;
    use tempfile::tempdir;

    fn factory(root: &std::path::Path) -> Arc<StoreFactory> {
        Arc::new(StoreFactory::new(
            Arc::new(IndexStore::new(root)),
            HybridConfig::default(),
            Arc::new(MockEmbeddingProvider::new(16)),
        ))
    }

    #[test]
    fn test_initial_progress() {
        let progress = BuildRunner::new().progress();
        assert_eq!(progress.status, BuildState::Idle);
        assert_eq!(progress.percent, 0);
        assert_eq!(progress.message, "No build started.");
        assert!(progress.root.is_none());
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let runner = BuildRunner::new();
        runner.start("/src").unwrap();
        let progress = runner.progress();
        assert_eq!(progress.status, BuildState::Running);
        assert_eq!(progress.percent, 5);
        assert_eq!(progress.message, "Preparing build from /src");

        let err = runner.start("/other").unwrap_err();
        assert!(matches!(err, Error::BuildInProgress(_)));
    }

    #[test]
    fn test_update_clamps_percent() {
        let runner = BuildRunner::new();
        runner.update("step", 150);
        assert_eq!(runner.progress().percent, 100);
        runner.update("step", -5);
        assert_eq!(runner.progress().percent, 0);
    }

    #[test]
    fn test_complete_fail_reset() {
        let runner = BuildRunner::new();
        runner.start("/src").unwrap();
        runner.complete("done");
        let progress = runner.progress();
        assert_eq!(progress.status, BuildState::Completed);
        assert_eq!(progress.percent, 100);
        assert_eq!(progress.output, "done");

        runner.start("/src").unwrap();
        runner.fail("broken", "trace", "partial");
        let progress = runner.progress();
        assert_eq!(progress.status, BuildState::Error);
        assert_eq!(progress.errors, "trace");
        assert!(!runner.is_running());

        runner.reset();
        assert_eq!(runner.progress(), BuildProgress::default());
    }

    #[test]
    fn test_state_serializes_lowercase() {
        let json = serde_json::to_string(&BuildState::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
    }

    #[tokio::test]
    async fn test_spawned_build_completes() {
        let dir = tempdir().unwrap();
        let factory = factory(dir.path());
        let registry = Arc::new(IndexRegistry::new(factory.clone()));
        let runner = BuildRunner::new();

        let handle = runner
            .spawn_build(
                factory.clone(),
                Some(registry.clone()),
                BuildRequest::new("notes").with_path("/notes"),
                vec!["alpha".into(), "beta".into()],
            )
            .unwrap();
        handle.await.unwrap();

        let progress = runner.progress();
        assert_eq!(progress.status, BuildState::Completed, "{progress:?}");
        assert!(progress.output.contains("Indexed 2 documents"));
        assert_eq!(progress.root.as_deref(), Some("/notes"));
        assert!(registry.get("notes").is_some());
    }

    #[tokio::test]
    async fn test_empty_build_fails() {
        let dir = tempdir().unwrap();
        let runner = BuildRunner::new();
        runner
            .spawn_build(
                factory(dir.path()),
                None,
                BuildRequest::new("notes"),
                Vec::new(),
            )
            .unwrap()
            .await
            .unwrap();

        let progress = runner.progress();
        assert_eq!(progress.status, BuildState::Error);
        assert_eq!(progress.message, "No documents found, aborting.");
    }

    #[tokio::test]
    async fn test_existing_index_without_force_fails() {
        let dir = tempdir().unwrap();
        let factory = factory(dir.path());
        let runner = BuildRunner::new();
        for _ in 0..2 {
            runner
                .spawn_build(
                    factory.clone(),
                    None,
                    BuildRequest::new("notes"),
                    vec!["alpha".into()],
                )
                .unwrap()
                .await
                .unwrap();
        }

        let progress = runner.progress();
        assert_eq!(progress.status, BuildState::Error);
        assert_eq!(progress.message, "Index already exists. Use --force to rebuild.");
    }
}
