//! The `codeqa` application.

use std::sync::Arc;

use codeqa_core::{Error, ErrorKind, Result};
use tracing_subscriber::EnvFilter;

use crate::cli::{CliArgs, Command};
use crate::config::AppConfig;
use crate::index_handlers::{BuildOptions, SearchOptions};
use crate::{config_handlers, index_handlers};

// ============================================================================
// CodeqaCli
// ============================================================================

/// CLI application over a loaded [`AppConfig`].
pub struct CodeqaCli {
    config: Arc<AppConfig>,
    version: String,
}

impl CodeqaCli {
    /// Create from CLI args, loading config from file/env.
    pub fn from_args(args: &CliArgs) -> Result<Self> {
        let config = AppConfig::load(args.config.as_deref())?;
        Ok(Self::new(config))
    }

    /// Create a new CLI application.
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(config),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Override the version string.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Initialise tracing-based logging.
    ///
    /// Uses `RUST_LOG` env var if set, otherwise defaults based on verbosity flags.
    pub fn init_logging(&self, verbose: bool, quiet: bool) {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else if quiet {
            EnvFilter::new("warn")
        } else if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        };

        // A subscriber may already be set (e.g. in tests).
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    }

    /// Run the CLI with the given arguments.
    pub async fn run(&self, args: CliArgs) -> Result<()> {
        self.init_logging(args.verbose, args.quiet);
        let config = &*self.config;

        match args.command {
            Some(Command::Build {
                docs,
                id,
                name,
                description,
                force,
            }) => {
                let options = BuildOptions {
                    docs,
                    id,
                    name,
                    description,
                    force,
                };
                index_handlers::handle_build(config, options).await
            }
            Some(Command::Search {
                query,
                id,
                top_k,
                weight,
                json,
            }) => {
                let options = SearchOptions {
                    query,
                    id,
                    top_k,
                    weight,
                    json,
                };
                index_handlers::handle_search(config, options).await
            }
            Some(Command::Reindex { id }) => index_handlers::handle_reindex(config, &id).await,
            Some(Command::Check { id }) => index_handlers::handle_check(config, &id),
            Some(Command::Status { id, json }) => {
                index_handlers::handle_status(config, id.as_deref(), json).await
            }
            Some(Command::Version) => {
                println!("codeqa {}", self.version);
                Ok(())
            }
            Some(Command::Config(config_cmd)) => {
                config_handlers::handle_config_command(args.config.as_deref(), config_cmd.command)
            }
            None => {
                println!("codeqa {}, use --help for usage", self.version);
                Ok(())
            }
        }
    }
}

/// Process exit code for an error: 2 for bad input, 3 when the index is
/// unavailable, 1 otherwise.
pub fn exit_code(err: &Error) -> u8 {
    match err.kind() {
        ErrorKind::BadInput => 2,
        ErrorKind::Unavailable => 3,
        ErrorKind::Internal => 1,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use codeqa_core::traits::ConfigProvider;
    use codeqa_index::{IndexStore, corpus_checksum};
    use std::path::Path;
    use tempfile::tempdir;

    fn mock_config(data_dir: &Path) -> AppConfig {
        let mut config = AppConfig {
            data_dir: Some(data_dir.to_string_lossy().to_string()),
            ..AppConfig::default()
        };
        config.embedding.provider = "mock".to_string();
        config.embedding.mock_dimension = 16;
        config
    }

    fn write_corpus(dir: &Path) -> String {
        let path = dir.join("corpus.json");
        std::fs::write(
            &path,
            r#"["cats purr softly", "dogs bark loudly", "cats and dogs play"]"#,
        )
        .unwrap();
        path.to_string_lossy().to_string()
    }

    async fn run(cli: &CodeqaCli, argv: &[&str]) -> Result<()> {
        let mut full = vec!["codeqa"];
        full.extend_from_slice(argv);
        cli.run(CliArgs::parse_from(full)).await
    }

    #[test]
    fn test_codeqa_cli_new() {
        let cli = CodeqaCli::new(AppConfig::default()).with_version("1.2.3");
        assert_eq!(cli.version, "1.2.3");
        assert_eq!(cli.config().project_name, "codeqa");
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&Error::build_input("empty")), 2);
        assert_eq!(exit_code(&Error::config("bad")), 2);
        assert_eq!(exit_code(&Error::not_ready("no contexts")), 3);
        assert_eq!(exit_code(&Error::operation("boom")), 1);
    }

    #[tokio::test]
    async fn test_run_version_and_no_command() {
        let cli = CodeqaCli::new(AppConfig::default());
        assert!(run(&cli, &["version"]).await.is_ok());
        assert!(run(&cli, &[]).await.is_ok());
    }

    #[tokio::test]
    async fn test_build_search_check_status() {
        let dir = tempdir().unwrap();
        let config = mock_config(&dir.path().join("data"));
        let cli = CodeqaCli::new(config.clone());
        let corpus = write_corpus(dir.path());

        run(&cli, &["build", "--docs", &corpus, "--id", "pets", "--name", "Pets"])
            .await
            .unwrap();

        let store = IndexStore::new(config.data_dir().unwrap());
        let metadata = store.metadata("pets").unwrap();
        assert_eq!(metadata.name, "Pets");
        assert_eq!(metadata.total_chunks, 3);

        run(&cli, &["search", "cats", "--id", "pets", "-k", "2"])
            .await
            .unwrap();
        run(&cli, &["search", "cats", "--id", "pets", "--json"])
            .await
            .unwrap();
        run(&cli, &["check", "--id", "pets"]).await.unwrap();
        run(&cli, &["status"]).await.unwrap();
        run(&cli, &["status", "--id", "pets", "--json"]).await.unwrap();
        run(&cli, &["reindex", "--id", "pets"]).await.unwrap();

        let docs: Vec<String> =
            serde_json::from_slice(&std::fs::read(store.paths("pets").docs).unwrap()).unwrap();
        assert_eq!(docs.len(), 3);
        assert!(!corpus_checksum(&docs).is_empty());
    }

    #[tokio::test]
    async fn test_rebuild_requires_force() {
        let dir = tempdir().unwrap();
        let cli = CodeqaCli::new(mock_config(&dir.path().join("data")));
        let corpus = write_corpus(dir.path());

        run(&cli, &["build", "--docs", &corpus]).await.unwrap();
        let err = run(&cli, &["build", "--docs", &corpus]).await.unwrap_err();
        assert!(err.to_string().contains("Use --force to rebuild"));
        assert_eq!(exit_code(&err), 2);

        run(&cli, &["build", "--docs", &corpus, "--force"])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_missing_index_is_unavailable() {
        let dir = tempdir().unwrap();
        let cli = CodeqaCli::new(mock_config(dir.path()));

        for argv in [
            &["search", "cats", "--id", "absent"][..],
            &["check", "--id", "absent"][..],
            &["status", "--id", "absent"][..],
        ] {
            let err = run(&cli, argv).await.unwrap_err();
            assert_eq!(exit_code(&err), 3, "{argv:?}: {err}");
        }
    }

    #[tokio::test]
    async fn test_build_from_empty_file_is_bad_input() {
        let dir = tempdir().unwrap();
        let cli = CodeqaCli::new(mock_config(&dir.path().join("data")));
        let corpus = dir.path().join("empty.txt");
        std::fs::write(&corpus, "\n").unwrap();

        let err = run(&cli, &["build", "--docs", &corpus.to_string_lossy()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BuildInput(_)));
    }
}
