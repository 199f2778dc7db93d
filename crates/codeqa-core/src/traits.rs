//! Core traits for CodeQA configuration.
//!
//! The CLI and any embedding service implement [`ConfigProvider`] so the
//! index store can find its data directory without knowing how the
//! configuration was loaded.

use std::path::PathBuf;

use crate::Result;

/// Trait for application configuration.
///
/// # Bounds
///
/// - `Send + Sync`: Configuration must be shareable across threads
/// - `Clone`: Configuration can be duplicated for passing to subsystems
/// - `'static`: Configuration lifetime is not borrowed
///
/// # Example
///
/// ```
/// use std::path::PathBuf;
/// use codeqa_core::traits::ConfigProvider;
/// use codeqa_core::Result;
///
/// #[derive(Clone)]
/// struct ServiceConfig {
///     data_dir: PathBuf,
/// }
///
/// impl ConfigProvider for ServiceConfig {
///     fn project_name(&self) -> &str {
///         "codeqa"
///     }
///
///     fn data_dir(&self) -> Result<PathBuf> {
///         Ok(self.data_dir.clone())
///     }
/// }
///
/// let config = ServiceConfig { data_dir: PathBuf::from("/srv/rag") };
/// assert_eq!(config.index_dir("docs").unwrap(), PathBuf::from("/srv/rag/docs"));
/// ```
pub trait ConfigProvider: Send + Sync + Clone + 'static {
    /// The project name, used for env var prefixes and default paths.
    fn project_name(&self) -> &str;

    /// Root directory under which every index directory is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be determined.
    fn data_dir(&self) -> Result<PathBuf>;

    /// Directory holding the artifacts of one index.
    ///
    /// The default places each index in a subdirectory named after its id.
    fn index_dir(&self, id: &str) -> Result<PathBuf> {
        Ok(self.data_dir()?.join(id))
    }
}
