//! Configuration for the `codeqa` CLI.
//!
//! Provides the [`AppConfig`] struct that loads from TOML files,
//! environment variables, and defaults using the `confyg` crate.
//!
//! # Loading Priority
//!
//! 1. Explicit `--config <path>` flag
//! 2. `CODEQA_CONFIG` environment variable
//! 3. XDG default: `~/.config/codeqa/config.toml`
//! 4. Built-in defaults
//!
//! `CODEQA_<SECTION>_<KEY>` variables override file values for the
//! `index`, `embedding` and `cache` sections.

use std::path::PathBuf;

use codeqa_core::traits::ConfigProvider;
use codeqa_core::util::paths::{default_data_dir, expand_tilde};
use codeqa_core::{Error, Result};
use codeqa_index::HybridConfig;
use codeqa_vector::{CacheConfig, EmbeddingConfig};
use confyg::{Confygery, env};
use serde::{Deserialize, Serialize};

// ============================================================================
// Configuration structs
// ============================================================================

/// Main configuration for the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Project name, used for default paths.
    pub project_name: String,

    /// Root directory of every index; defaults to the platform data dir.
    pub data_dir: Option<String>,

    /// Hybrid index tuning.
    pub index: HybridConfig,

    /// Embedding model selection.
    pub embedding: EmbeddingConfig,

    /// Query embedding cache.
    pub cache: CacheConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            project_name: "codeqa".to_string(),
            data_dir: None,
            index: HybridConfig::default(),
            embedding: EmbeddingConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

// ============================================================================
// Config loading
// ============================================================================

impl AppConfig {
    /// Load configuration from file, environment, and defaults.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder =
            Confygery::new().map_err(|e| Error::config(format!("config init: {e}")))?;

        if let Some(path) = Self::resolve_config_path(config_path)
            && path.exists()
        {
            builder
                .add_file(&path.to_string_lossy())
                .map_err(|e| Error::config(format!("config file: {e}")))?;
        }

        let mut env_opts = env::Options::with_top_level("CODEQA");
        env_opts.add_section("index");
        env_opts.add_section("embedding");
        env_opts.add_section("cache");
        builder
            .add_env(env_opts)
            .map_err(|e| Error::config(format!("config env: {e}")))?;

        let config: Self = builder
            .build()
            .map_err(|e| Error::config(format!("config build: {e}")))?;

        Ok(config)
    }

    /// Resolve the config file path from explicit flag, env var, or XDG default.
    pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(PathBuf::from(path));
        }

        if let Ok(path) = std::env::var("CODEQA_CONFIG") {
            return Some(PathBuf::from(path));
        }

        Self::default_config_path()
    }

    /// Return the XDG default config path.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("codeqa").join("config.toml"))
    }

    /// Serialize this config to a pretty-printed TOML string.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }
}

// ============================================================================
// ConfigProvider implementation
// ============================================================================

impl ConfigProvider for AppConfig {
    fn project_name(&self) -> &str {
        &self.project_name
    }

    fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(expand_tilde(dir)),
            None => default_data_dir(&self.project_name).ok_or_else(|| {
                Error::config("Could not determine a data directory; set `data_dir`")
            }),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
