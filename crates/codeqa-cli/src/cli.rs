//! CLI argument parsing and command definitions.

use clap::{Parser, Subcommand};

// ============================================================================
// CLI argument types
// ============================================================================

/// Build and query hybrid retrieval indices.
#[derive(Parser, Debug)]
#[command(name = "codeqa", author, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file.
    #[arg(short, long, env = "CODEQA_CONFIG")]
    pub config: Option<String>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress non-essential output.
    #[arg(short, long)]
    pub quiet: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build an index from a document file and swap it into service.
    Build {
        /// Documents: a JSON array of strings, or text with blank-line separated documents.
        #[arg(short, long)]
        docs: String,

        /// Index identifier.
        #[arg(long, default_value = "default")]
        id: String,

        /// Display name recorded in the index metadata.
        #[arg(long)]
        name: Option<String>,

        /// Description recorded in the index metadata.
        #[arg(long, default_value = "")]
        description: String,

        /// Replace an existing index.
        #[arg(short, long)]
        force: bool,
    },

    /// Search an index.
    Search {
        /// Query text.
        query: String,

        /// Index identifier.
        #[arg(long, default_value = "default")]
        id: String,

        /// Number of results (defaults to `index.default_top_k`).
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Dense weight in [0, 1] (defaults to `index.default_fusion_weight`).
        #[arg(short, long)]
        weight: Option<f32>,

        /// Output results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Rebuild lexical structures in place, reusing persisted embeddings.
    Reindex {
        /// Index identifier.
        #[arg(long, default_value = "default")]
        id: String,
    },

    /// Check freshness of persisted artifacts without loading a model.
    Check {
        /// Index identifier.
        #[arg(long, default_value = "default")]
        id: String,
    },

    /// List served indices, or show one index's status.
    Status {
        /// Index identifier; omit to list every index.
        #[arg(long)]
        id: Option<String>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print version information.
    Version,

    /// Configuration operations.
    Config(ConfigCommand),
}

/// Config-specific subcommands.
#[derive(Parser, Debug)]
pub struct ConfigCommand {
    /// Config subcommand to execute.
    #[command(subcommand)]
    pub command: ConfigAction,
}

/// Available config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the resolved config file path.
    Path,

    /// Print the effective configuration as TOML.
    Show,

    /// Create a default configuration file.
    Init {
        /// Output file path (defaults to XDG config path).
        #[arg(short, long)]
        file: Option<String>,

        /// Overwrite existing file.
        #[arg(long)]
        force: bool,
    },
}

// ============================================================================
// Tests
// ============================================================================
