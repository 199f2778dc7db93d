//! Durable index rebuilds.
//!
//! An [`IndexStore`] keeps one serving directory per index id under a root:
//!
//! ```text
//! <root>/<id>/        serving index + metadata.json
//! <root>/<id>.tmp/    build in progress
//! <root>/<id>.bak/    previous serving index, until commit
//! <root>/<id>.lock    exclusive lock held for build + swap
//! ```
//!
//! A rebuild writes into the temp directory, then renames the serving
//! directory to the backup and the temp directory into place. Readers see
//! either the old directory or the new one. If anything fails the old
//! directory is put back; the backup is only deleted on
//! [`PendingSwap::commit`].

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use codeqa_core::util::files::{
    read_artifact, remove_dir_if_exists, rename, reset_dir, write_atomic,
};
use codeqa_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;

use crate::config::IndexPaths;
use crate::hybrid::HybridIndex;

/// File name of the per-index description.
pub const METADATA_FILE: &str = "metadata.json";

// ============================================================================
// Types
// ============================================================================

/// Description of one served index, stored as `metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// Index identifier; also the serving directory name.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Where the indexed content came from.
    #[serde(default)]
    pub path: String,
    /// Number of indexed documents.
    #[serde(default)]
    pub total_chunks: usize,
}

/// What to rebuild.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Index identifier.
    pub id: String,
    /// Display name; defaults to the id.
    pub name: Option<String>,
    /// Free-form description.
    pub description: String,
    /// Where the content came from.
    pub path: String,
    /// Replace an existing index.
    pub force: bool,
}

impl BuildRequest {
    /// A request for `id` with no description.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            description: String::new(),
            path: String::new(),
            force: false,
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Record the content location.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Allow replacing an existing index.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Exclusive access to one index id, in-process and across processes.
struct IdLock {
    _file: File,
    _guard: OwnedMutexGuard<()>,
}

// ============================================================================
// IndexStore
// ============================================================================

/// Serving directories for a set of indices, with atomic rebuilds.
#[derive(Debug)]
pub struct IndexStore {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl IndexStore {
    /// A store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Serving directory of `id`.
    pub fn serving_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// Artifact paths of the serving index `id`.
    pub fn paths(&self, id: &str) -> IndexPaths {
        IndexPaths::in_dir(self.serving_dir(id))
    }

    fn temp_dir(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.tmp"))
    }

    fn backup_dir(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.bak"))
    }

    fn lock_file(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.lock"))
    }

    /// Whether `id` has a serving index.
    pub fn exists(&self, id: &str) -> bool {
        self.paths(id).docs.exists()
    }

    /// Read `metadata.json` of `id`.
    pub fn metadata(&self, id: &str) -> Result<SourceMetadata> {
        let bytes = read_artifact(&self.serving_dir(id).join(METADATA_FILE))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Metadata of every served index, sorted by id.
    ///
    /// Directories without readable metadata are skipped.
    pub fn list(&self) -> Result<Vec<SourceMetadata>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io_with_path(e, &self.root)),
        };

        let mut sources = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::io_with_path(e, &self.root))?;
            if !entry.path().is_dir() {
                continue;
            }
            let Some(id) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if id.ends_with(".tmp") || id.ends_with(".bak") {
                continue;
            }
            match self.metadata(&id) {
                Ok(meta) => sources.push(meta),
                Err(e) => log::debug!("Skipping {id}: {e}"),
            }
        }
        sources.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(sources)
    }

    /// Rebuild index `request.id` via `build`, then swap it into service.
    ///
    /// `build` receives the artifact paths inside the temp directory and
    /// must return the built index. Builds of the same id are serialized.
    /// Without `force`, an existing index is an error. On failure the
    /// serving directory is left as it was and the temp directory removed.
    pub async fn rebuild<F, Fut>(&self, request: BuildRequest, build: F) -> Result<PendingSwap>
    where
        F: FnOnce(IndexPaths) -> Fut,
        Fut: Future<Output = Result<HybridIndex>>,
    {
        let id = request.id.clone();
        validate_id(&id)?;
        fs::create_dir_all(&self.root).map_err(|e| Error::io_with_path(e, &self.root))?;
        let lock = self.acquire(&id).await?;
        self.recover_backup(&id)?;

        if self.exists(&id) && !request.force {
            return Err(Error::config("Index already exists. Use --force to rebuild."));
        }

        let temp = self.temp_dir(&id);
        reset_dir(&temp)?;
        log::info!("Building index '{id}' in {}", temp.display());

        let built = build(IndexPaths::in_dir(&temp)).await;
        let result = match built {
            Ok(index) => self.swap_in(&request, index),
            Err(e) => Err(e),
        };

        if let Err(e) = remove_dir_if_exists(&temp) {
            log::warn!("Could not remove {}: {e}", temp.display());
        }

        let (index, backup, metadata) = result?;
        log::info!("Index '{id}' swapped into service");
        Ok(PendingSwap {
            serving: self.serving_dir(&id),
            backup,
            index,
            metadata,
            _lock: lock,
        })
    }

    /// Re-derive the serving index `id` in place via `reindex`.
    ///
    /// Runs under the same lock as [`IndexStore::rebuild`], so it waits for
    /// a pending swap of `id` and never interleaves with another build.
    /// `reindex` receives the serving artifact paths and returns the
    /// rebuilt index; `metadata.json` is then updated to its document count.
    pub async fn reindex<F, Fut>(&self, id: &str, reindex: F) -> Result<HybridIndex>
    where
        F: FnOnce(IndexPaths) -> Fut,
        Fut: Future<Output = Result<HybridIndex>>,
    {
        validate_id(id)?;
        fs::create_dir_all(&self.root).map_err(|e| Error::io_with_path(e, &self.root))?;
        let _lock = self.acquire(id).await?;
        self.recover_backup(id)?;

        if !self.exists(id) {
            return Err(Error::persistence_missing(format!(
                "No index '{id}' under {}",
                self.root.display()
            )));
        }

        log::info!("Reindexing '{id}' in place");
        let index = reindex(self.paths(id)).await?;

        let mut metadata = self.metadata(id).unwrap_or_else(|e| {
            log::warn!("Rewriting unreadable metadata of '{id}': {e}");
            SourceMetadata {
                id: id.to_string(),
                name: id.to_string(),
                description: String::new(),
                path: String::new(),
                total_chunks: 0,
            }
        });
        metadata.total_chunks = index.status().document_count;
        let json = serde_json::to_string_pretty(&metadata)?;
        write_atomic(&self.serving_dir(id).join(METADATA_FILE), json.as_bytes())?;
        Ok(index)
    }

    /// Put back a backup orphaned by a crash between the two swap renames.
    fn recover_backup(&self, id: &str) -> Result<()> {
        let serving = self.serving_dir(id);
        let backup = self.backup_dir(id);
        if !serving.exists() && backup.is_dir() {
            log::warn!("Restoring orphaned backup {}", backup.display());
            rename(&backup, &serving)?;
        }
        Ok(())
    }

    /// Swap the temp directory into service, restoring on any failure.
    fn swap_in(
        &self,
        request: &BuildRequest,
        index: HybridIndex,
    ) -> Result<(HybridIndex, Option<PathBuf>, SourceMetadata)> {
        let id = &request.id;
        let serving = self.serving_dir(id);
        let backup = self.backup_dir(id);

        let had_serving = serving.exists();
        if had_serving {
            remove_dir_if_exists(&backup)?;
            rename(&serving, &backup)?;
        }
        let backup = had_serving.then_some(backup);

        let installed = rename(&self.temp_dir(id), &serving).and_then(|()| {
            let metadata = SourceMetadata {
                id: id.clone(),
                name: request.name.clone().unwrap_or_else(|| id.clone()),
                description: request.description.clone(),
                path: request.path.clone(),
                total_chunks: index.status().document_count,
            };
            let json = serde_json::to_string_pretty(&metadata)?;
            write_atomic(&serving.join(METADATA_FILE), json.as_bytes())?;
            let index = index.rebased(IndexPaths::in_dir(&serving))?;
            Ok((index, metadata))
        });

        match installed {
            Ok((index, metadata)) => Ok((index, backup, metadata)),
            Err(e) => {
                log::error!("Swap of index '{id}' failed, restoring previous index: {e}");
                Err(restore_after_failure(&serving, backup.as_deref(), e))
            }
        }
    }

    async fn acquire(&self, id: &str) -> Result<IdLock> {
        let mutex = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id.to_string())
            .or_default()
            .clone();
        let guard = mutex.lock_owned().await;

        let path = self.lock_file(id);
        let file = tokio::task::spawn_blocking(move || -> Result<File> {
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&path)
                .map_err(|e| Error::io_with_path(e, &path))?;
            file.lock().map_err(|e| Error::io_with_path(e, &path))?;
            Ok(file)
        })
        .await
        .map_err(|e| Error::operation(format!("spawn_blocking failed: {e}")))??;

        Ok(IdLock {
            _file: file,
            _guard: guard,
        })
    }
}

fn validate_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains(['/', '\\'])
        && !id.ends_with(".tmp")
        && !id.ends_with(".bak")
        && !id.ends_with(".lock");
    if valid {
        Ok(())
    } else {
        Err(Error::config(format!("Invalid index id: '{id}'")))
    }
}

/// Put `backup` back at `serving`, discarding whatever is there.
fn restore(serving: &Path, backup: Option<&Path>) -> Result<()> {
    remove_dir_if_exists(serving)?;
    if let Some(backup) = backup {
        rename(backup, serving)?;
    }
    Ok(())
}

/// Restore after a failed swap, keeping `cause` as the reported error.
fn restore_after_failure(serving: &Path, backup: Option<&Path>, cause: Error) -> Error {
    if let Err(restore_err) = restore(serving, backup) {
        log::error!(
            "Could not restore {}: {restore_err}",
            backup.unwrap_or(serving).display()
        );
    }
    cause
}

// ============================================================================
// PendingSwap
// ============================================================================

/// A new index in service whose predecessor is still kept as a backup.
///
/// The id stays locked until the swap is committed or rolled back.
/// Dropping it without either keeps both directories.
#[derive(Debug)]
pub struct PendingSwap {
    serving: PathBuf,
    backup: Option<PathBuf>,
    index: HybridIndex,
    metadata: SourceMetadata,
    _lock: IdLock,
}

impl PendingSwap {
    /// The new index, addressed at the serving directory.
    pub fn index(&self) -> &HybridIndex {
        &self.index
    }

    /// Metadata written for the new index.
    pub fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    /// The backup of the previous index, if there was one.
    pub fn backup(&self) -> Option<&Path> {
        self.backup.as_deref()
    }

    /// Keep the new index and delete the backup.
    pub fn commit(self) -> Result<HybridIndex> {
        if let Some(backup) = &self.backup {
            remove_dir_if_exists(backup)?;
        }
        log::debug!("Committed index at {}", self.serving.display());
        Ok(self.index)
    }

    /// Discard the new index and put the previous one back.
    pub fn rollback(self) -> Result<()> {
        log::info!("Rolling back index at {}", self.serving.display());
        restore(&self.serving, self.backup.as_deref())
    }
}

impl std::fmt::Debug for IdLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("IdLock")
    }
}

// ============================================================================
// Tests
// ============================================================================
