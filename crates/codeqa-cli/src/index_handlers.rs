//! Handler functions for index CLI commands.
//!
//! Implements `codeqa {build,search,reindex,check,status}` on top of the
//! durable [`IndexStore`] pipeline.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use codeqa_core::traits::ConfigProvider;
use codeqa_core::util::paths::expand_tilde;
use codeqa_core::{Error, Result};
use codeqa_index::{
    BuildProgress, BuildRequest, BuildRunner, BuildState, IndexRegistry, IndexStore, StoreFactory,
    check_freshness,
};
use codeqa_vector::{
    EmbeddingConfig, EmbeddingProvider, FallbackEmbedder, FastEmbedLoader, MockEmbeddingProvider,
    create_query_cache,
};

use crate::config::AppConfig;
use crate::output;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// Options
// ============================================================================

/// Arguments of `codeqa build`.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Document file.
    pub docs: String,
    /// Index identifier.
    pub id: String,
    /// Display name.
    pub name: Option<String>,
    /// Description.
    pub description: String,
    /// Replace an existing index.
    pub force: bool,
}

/// Arguments of `codeqa search`.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Query text.
    pub query: String,
    /// Index identifier.
    pub id: String,
    /// Result count override.
    pub top_k: Option<usize>,
    /// Dense weight override.
    pub weight: Option<f32>,
    /// Emit JSON.
    pub json: bool,
}

// ============================================================================
// Command handlers
// ============================================================================

/// Build an index and swap it into service.
pub async fn handle_build(config: &AppConfig, options: BuildOptions) -> Result<()> {
    let docs_path = expand_tilde(&options.docs);
    let docs = read_documents(&docs_path)?;

    let factory = open_factory(config, open_store(config)?).await?;
    let mut request = BuildRequest::new(options.id)
        .with_description(options.description)
        .with_path(docs_path.display().to_string())
        .with_force(options.force);
    if let Some(name) = options.name {
        request = request.with_name(name);
    }

    let runner = BuildRunner::new();
    let handle = runner.spawn_build(factory, None, request, docs)?;

    let mut last_message = String::new();
    while !handle.is_finished() {
        let progress = runner.progress();
        if progress.message != last_message {
            log::info!("[{:>3}%] {}", progress.percent, progress.message);
            last_message = progress.message;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    handle
        .await
        .map_err(|e| Error::operation(format!("build task failed: {e}")))?;

    let progress = runner.progress();
    match progress.status {
        BuildState::Completed => {
            println!("{}", progress.output);
            Ok(())
        }
        _ => Err(build_error(progress)),
    }
}

/// Search an index.
pub async fn handle_search(config: &AppConfig, options: SearchOptions) -> Result<()> {
    let factory = open_factory(config, open_store(config)?).await?;
    let registry = IndexRegistry::new(factory);
    let index = registry.get_or_load(&options.id).await?;

    let k = options.top_k.unwrap_or(config.index.default_top_k);
    let weight = options
        .weight
        .unwrap_or(config.index.default_fusion_weight);
    let results = index.search(&options.query, k, weight).await?;

    let rendered = if options.json {
        output::format_search_json(&options.query, &results)
    } else {
        output::format_search_human(&options.query, &results)
    };
    println!("{rendered}");
    Ok(())
}

/// Rebuild lexical structures of an index in place.
///
/// Runs under the store's per-id lock, so it never overlaps a build swap.
pub async fn handle_reindex(config: &AppConfig, id: &str) -> Result<()> {
    let store = open_store(config)?;
    require_index(&store, id)?;

    let factory = open_factory(config, store.clone()).await?;
    let index = store
        .reindex(id, |paths| async move {
            let index = factory.index_at(paths);
            index.rebuild_lexical().await?;
            Ok::<_, Error>(index)
        })
        .await?;
    println!(
        "Rebuilt lexical structures for '{id}' ({} documents)",
        index.status().document_count
    );
    Ok(())
}

/// Report whether an index's persisted artifacts are fresh.
pub fn handle_check(config: &AppConfig, id: &str) -> Result<()> {
    let store = open_store(config)?;
    require_index(&store, id)?;

    let freshness = check_freshness(&store.paths(id), &config.index.version)?;
    println!("{}", output::format_freshness(id, &freshness));
    Ok(())
}

/// List served indices, or load one and show its status.
pub async fn handle_status(config: &AppConfig, id: Option<&str>, json: bool) -> Result<()> {
    let store = open_store(config)?;
    let Some(id) = id else {
        let sources = store.list()?;
        let rendered = if json {
            output::format_sources_json(&sources)
        } else {
            output::format_sources_human(&sources)
        };
        println!("{rendered}");
        return Ok(());
    };

    require_index(&store, id)?;
    let source = store.metadata(id).ok();
    let factory = open_factory(config, store).await?;
    let index = IndexRegistry::new(factory).get_or_load(id).await?;
    let status = index.status();

    let rendered = if json {
        output::format_status_json(id, &status, source.as_ref())
    } else {
        output::format_status_human(id, &status, source.as_ref())
    };
    println!("{rendered}");
    Ok(())
}

// ============================================================================
// Wiring
// ============================================================================

/// Construct the configured embedding provider.
///
/// Model construction may download weights, so it runs on the blocking pool.
pub async fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.to_lowercase().as_str() {
        "mock" => Ok(Arc::new(
            MockEmbeddingProvider::new(config.mock_dimension).with_name("mock"),
        )),
        "fastembed" => {
            let config = config.clone();
            let embedder = tokio::task::spawn_blocking(move || {
                FallbackEmbedder::from_config(&config, Arc::new(FastEmbedLoader::new()))
            })
            .await
            .map_err(|e| Error::operation(format!("model loading task failed: {e}")))??;
            Ok(Arc::new(embedder))
        }
        other => Err(Error::config(format!(
            "Unknown embedding provider: '{other}'. Supported: fastembed, mock"
        ))),
    }
}

fn open_store(config: &AppConfig) -> Result<Arc<IndexStore>> {
    Ok(Arc::new(IndexStore::new(config.data_dir()?)))
}

async fn open_factory(config: &AppConfig, store: Arc<IndexStore>) -> Result<Arc<StoreFactory>> {
    let embedder = build_embedder(&config.embedding).await?;
    let cache = create_query_cache(&config.cache).await?;
    Ok(Arc::new(
        StoreFactory::new(store, config.index.clone(), embedder).with_cache(cache),
    ))
}

fn require_index(store: &IndexStore, id: &str) -> Result<()> {
    if store.exists(id) {
        Ok(())
    } else {
        Err(Error::persistence_missing(format!(
            "No index '{id}' under {}",
            store.root().display()
        )))
    }
}

fn build_error(progress: BuildProgress) -> Error {
    if progress.errors.is_empty() {
        Error::config(progress.message)
    } else {
        Error::operation(format!("{} {}", progress.message, progress.errors))
    }
}

// ============================================================================
// Document input
// ============================================================================

/// Read the documents to index from `path`.
///
/// A `.json` file holds an array of strings. Any other file holds one
/// document per paragraph, paragraphs separated by blank lines.
pub fn read_documents(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::io_with_path(e, path))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let docs: Vec<String> = if is_json {
        serde_json::from_str(&content)?
    } else {
        split_paragraphs(&content)
    };

    if docs.is_empty() {
        return Err(Error::build_input(format!(
            "No documents found in {}",
            path.display()
        )));
    }
    Ok(docs)
}

fn split_paragraphs(content: &str) -> Vec<String> {
    let mut docs = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                docs.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line.trim_end());
        }
    }
    if !current.is_empty() {
        docs.push(current.join("\n"));
    }
    docs
}

// ============================================================================
// Tests
// ============================================================================
