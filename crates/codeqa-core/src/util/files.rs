//! File utilities shared by the persistence and build layers.
//!
//! Artifact writes go through [`write_atomic`] so a crash mid-write never
//! leaves a truncated file under the final name.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::{Error, Result};

use super::paths::with_suffix;

/// Write `bytes` to `path` via a sibling temp file and a rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| Error::io_with_path(e, parent))?;
    }

    let tmp = with_suffix(path, "part");
    {
        let mut file = fs::File::create(&tmp).map_err(|e| Error::io_with_path(e, &tmp))?;
        file.write_all(bytes)
            .map_err(|e| Error::io_with_path(e, &tmp))?;
        file.sync_all().map_err(|e| Error::io_with_path(e, &tmp))?;
    }
    fs::rename(&tmp, path).map_err(|e| Error::io_with_path(e, path))?;
    Ok(())
}

/// Read a whole file, mapping a missing file to `PersistenceMissing`.
pub fn read_artifact(path: &Path) -> Result<Vec<u8>> {
    match fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::persistence_missing(
            format!("{} does not exist", path.display()),
        )),
        Err(e) => Err(Error::io_with_path(e, path)),
    }
}

/// Remove a directory tree if present. Missing directories are not an error.
pub fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io_with_path(e, path)),
    }
}

/// Remove any existing directory at `path` and create it empty.
pub fn reset_dir(path: &Path) -> Result<()> {
    remove_dir_if_exists(path)?;
    fs::create_dir_all(path).map_err(|e| Error::io_with_path(e, path))
}

/// Rename `from` to `to`, attaching the source path on failure.
pub fn rename(from: &Path, to: &Path) -> Result<()> {
    fs::rename(from, to).map_err(|e| Error::io_with_path(e, from))
}
