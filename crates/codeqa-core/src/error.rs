//! Error types for CodeQA operations.
//!
//! This module provides a common `Error` type and `Result<T>` alias used across
//! all CodeQA crates. Uses `thiserror` for derive macros.
//!
//! Callers at the service boundary use [`Error::kind`] to decide how to signal
//! a failure: bad input, not-yet-available, or an internal fault.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur in CodeQA operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error tied to a specific path.
    #[error("I/O error at {path}: {source}")]
    IoWithPath {
        /// The path being accessed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Content not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid data or format.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A backend operation failed.
    #[error("Operation failed: {0}")]
    Operation(String),

    /// The build input was unusable (e.g. an empty corpus).
    #[error("Invalid build input: {0}")]
    BuildInput(String),

    /// Persisted index artifacts are missing or unreadable.
    #[error("Missing index: {0}")]
    PersistenceMissing(String),

    /// Neither the primary nor the fallback embedding model could be constructed.
    #[error("Embedding model unavailable: {0}")]
    ModelUnavailable(String),

    /// A runtime dependency required by a model family is absent.
    #[error("Missing dependency '{dependency}': {remediation}")]
    DependencyMissing {
        /// Name of the missing dependency.
        dependency: String,
        /// What the operator should do about it.
        remediation: String,
    },

    /// The index has not been built or loaded, or holds no documents.
    #[error("Index not ready: {0}")]
    IndexNotReady(String),

    /// Another build is already running.
    #[error("Build already in progress: {0}")]
    BuildInProgress(String),
}

/// Coarse classification used to map errors onto boundary status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller supplied unusable input (bad-request).
    BadInput,
    /// The service cannot answer yet (service-unavailable).
    Unavailable,
    /// Anything else (internal-error).
    Internal,
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid data error.
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    /// Create an operation error.
    pub fn operation(msg: impl Into<String>) -> Self {
        Self::Operation(msg.into())
    }

    /// Create a build input error.
    pub fn build_input(msg: impl Into<String>) -> Self {
        Self::BuildInput(msg.into())
    }

    /// Create a missing-persistence error.
    pub fn persistence_missing(msg: impl Into<String>) -> Self {
        Self::PersistenceMissing(msg.into())
    }

    /// Create a model unavailable error.
    pub fn model_unavailable(msg: impl Into<String>) -> Self {
        Self::ModelUnavailable(msg.into())
    }

    /// Create a dependency missing error with an actionable remediation.
    pub fn dependency_missing(
        dependency: impl Into<String>,
        remediation: impl Into<String>,
    ) -> Self {
        Self::DependencyMissing {
            dependency: dependency.into(),
            remediation: remediation.into(),
        }
    }

    /// Create an index-not-ready error.
    pub fn not_ready(msg: impl Into<String>) -> Self {
        Self::IndexNotReady(msg.into())
    }

    /// Create a build-in-progress error.
    pub fn build_in_progress(msg: impl Into<String>) -> Self {
        Self::BuildInProgress(msg.into())
    }

    /// Wrap an I/O error with the path that caused it.
    pub fn io_with_path(source: std::io::Error, path: impl AsRef<Path>) -> Self {
        Self::IoWithPath {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Classify this error for the calling layer.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BuildInput(_) | Self::Config(_) => ErrorKind::BadInput,
            Self::IndexNotReady(_) | Self::PersistenceMissing(_) | Self::BuildInProgress(_) => {
                ErrorKind::Unavailable
            }
            _ => ErrorKind::Internal,
        }
    }

    /// Whether this error means the index should be rebuilt before use.
    pub fn is_missing_index(&self) -> bool {
        matches!(self, Self::PersistenceMissing(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type alias using CodeQA's Error type.
pub type Result<T> = std::result::Result<T, Error>;
