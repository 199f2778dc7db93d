//! Utility modules for file operations and path handling.
//!
//! # Modules
//!
//! - [`files`]: Atomic writes and directory swap helpers
//! - [`paths`]: Path resolution helpers (tilde expansion, sibling paths)

pub mod files;
pub mod paths;
