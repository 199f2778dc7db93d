//! Command-line interface for CodeQA.
//!
//! The `codeqa` binary builds hybrid retrieval indices from document files,
//! swaps them into service atomically, and searches them.
//!
//! # Commands
//!
//! - `build`: embed and index a corpus, then swap it into its serving directory
//! - `search`: fused dense + keyword retrieval against one index
//! - `reindex`: rebuild lexical structures from persisted documents
//! - `check`: report freshness of persisted artifacts
//! - `status`: list indices, or show one index's readiness
//! - `config`: show, locate or initialise the configuration file

pub mod app;
pub mod cli;
pub mod config;
pub mod config_handlers;
pub mod index_handlers;
pub mod output;

pub use app::{CodeqaCli, exit_code};
pub use cli::{CliArgs, Command, ConfigAction, ConfigCommand};
pub use config::AppConfig;
