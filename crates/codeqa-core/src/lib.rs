//! CodeQA Core: shared errors, traits, and utilities.
//!
//! This crate provides the foundational types used across all CodeQA crates.
//! It has no internal CodeQA dependencies (dependency level 0).
//!
//! # Modules
//!
//! - [`error`]: Error taxonomy, boundary classification, and Result alias
//! - [`traits`]: Configuration abstraction shared by the CLI and index store
//! - [`util`]: Atomic file writes, directory swaps, and path helpers

pub mod error;
pub mod traits;
pub mod util;

// Re-export key types at crate root for convenience
pub use error::{Error, ErrorKind, Result};
pub use traits::ConfigProvider;
