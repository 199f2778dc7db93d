//! On-disk fuzzy inverted index.
//!
//! Building always starts from an empty directory; there is no incremental
//! update. Searching is soft-fail: a blank query or a directory without an
//! index returns no hits.

use std::path::{Path, PathBuf};

use codeqa_core::util::files::reset_dir;
use codeqa_core::{Error, Result};
use tantivy::collector::TopDocs;
use tantivy::schema::Value;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument};

use crate::query::QueryBuilder;
use crate::schema::FuzzySchema;
use crate::types::FuzzyOptions;

/// Writer heap shared by all indexing threads.
const WRITER_HEAP_BYTES: usize = 50_000_000;

/// Marker file Tantivy writes on the first commit.
const META_FILE: &str = "meta.json";

struct Opened {
    reader: IndexReader,
    schema: FuzzySchema,
}

/// Typo-tolerant inverted index keyed by document ordinal.
pub struct FuzzyIndex {
    dir: PathBuf,
    options: FuzzyOptions,
    opened: Option<Opened>,
}

impl FuzzyIndex {
    /// Whether `dir` holds a committed index.
    pub fn exists(dir: &Path) -> bool {
        dir.join(META_FILE).is_file()
    }

    /// Build a fresh index over `docs` in `dir`, wiping whatever was there.
    pub fn build<S: AsRef<str>>(docs: &[S], dir: &Path, options: FuzzyOptions) -> Result<Self> {
        reset_dir(dir)?;

        let schema = FuzzySchema::build();
        let index = Index::create_in_dir(dir, schema.schema())
            .map_err(|e| Error::operation(format!("Failed to create fuzzy index: {e}")))?;
        FuzzySchema::register_tokenizers(&index);

        let mut writer: IndexWriter = index
            .writer(WRITER_HEAP_BYTES)
            .map_err(|e| Error::operation(format!("Failed to create index writer: {e}")))?;

        for (ordinal, text) in docs.iter().enumerate() {
            let mut doc = TantivyDocument::default();
            doc.add_text(schema.doc_id, ordinal.to_string());
            doc.add_text(schema.content, text.as_ref());
            writer
                .add_document(doc)
                .map_err(|e| Error::operation(format!("Failed to add document {ordinal}: {e}")))?;
        }

        writer
            .commit()
            .map_err(|e| Error::operation(format!("Failed to commit fuzzy index: {e}")))?;
        writer
            .wait_merging_threads()
            .map_err(|e| Error::operation(format!("Failed to finish merges: {e}")))?;

        log::debug!(
            "Built fuzzy index with {} documents at {}",
            docs.len(),
            dir.display()
        );

        let reader = open_reader(&index)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            options,
            opened: Some(Opened { reader, schema }),
        })
    }

    /// Open an existing index.
    ///
    /// Fails with a missing-index error if `dir` holds no committed index.
    pub fn open(dir: &Path, options: FuzzyOptions) -> Result<Self> {
        if !Self::exists(dir) {
            return Err(Error::persistence_missing(format!(
                "Fuzzy index not found in {}",
                dir.display()
            )));
        }

        let index = Index::open_in_dir(dir)
            .map_err(|e| Error::operation(format!("Failed to open fuzzy index: {e}")))?;
        FuzzySchema::register_tokenizers(&index);
        let schema = FuzzySchema::from_index(&index)?;
        let reader = open_reader(&index)?;

        Ok(Self {
            dir: dir.to_path_buf(),
            options,
            opened: Some(Opened { reader, schema }),
        })
    }

    /// A handle with no index behind it; every search returns nothing.
    pub fn detached(dir: &Path, options: FuzzyOptions) -> Self {
        Self {
            dir: dir.to_path_buf(),
            options,
            opened: None,
        }
    }

    /// Top `limit` documents for `query` as `(ordinal, score)`, best first.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<(usize, f32)>> {
        if query.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let Some(opened) = &self.opened else {
            return Ok(Vec::new());
        };
        if !Self::exists(&self.dir) {
            log::debug!("Fuzzy index missing at {}, skipping", self.dir.display());
            return Ok(Vec::new());
        }

        let builder = QueryBuilder::new(&opened.schema, self.options);
        let Some(query) = builder.build_query(query) else {
            return Ok(Vec::new());
        };

        let searcher = opened.reader.searcher();
        let top_docs = searcher
            .search(query.as_ref(), &TopDocs::with_limit(limit))
            .map_err(|e| Error::operation(format!("Fuzzy search failed: {e}")))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(address)
                .map_err(|e| Error::operation(format!("Failed to retrieve document: {e}")))?;
            let ordinal = doc
                .get_first(opened.schema.doc_id)
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse::<usize>().ok());
            match ordinal {
                Some(ordinal) => hits.push((ordinal, score)),
                None => log::warn!("Fuzzy hit without a usable doc_id, skipping"),
            }
        }
        Ok(hits)
    }

    /// Number of indexed documents.
    pub fn num_docs(&self) -> u64 {
        self.opened
            .as_ref()
            .map(|o| o.reader.searcher().num_docs())
            .unwrap_or(0)
    }

    /// Directory the index lives in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Fuzzy matching options in effect.
    pub fn options(&self) -> FuzzyOptions {
        self.options
    }
}

fn open_reader(index: &Index) -> Result<IndexReader> {
    index
        .reader_builder()
        .reload_policy(ReloadPolicy::Manual)
        .try_into()
        .map_err(|e| Error::operation(format!("Failed to create reader: {e}")))
}

impl std::fmt::Debug for FuzzyIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FuzzyIndex")
            .field("dir", &self.dir)
            .field("options", &self.options)
            .field("opened", &self.opened.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn docs() -> Vec<&'static str> {
        vec![
            "the retrieval pipeline embeds every chunk",
            "keyword scoring uses term frequency",
            "atomic directory swap keeps the old index",
        ]
    }

    #[test]
    fn test_build_and_exact_search() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fuzzy_index");
        let index = FuzzyIndex::build(&docs(), &path, FuzzyOptions::default()).unwrap();

        assert_eq!(index.num_docs(), 3);
        let hits = index.search("keyword", 5).unwrap();
        assert_eq!(hits[0].0, 1);
        assert!(hits[0].1 > 0.0);
    }

    #[test]
    fn test_typo_tolerant_search() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fuzzy_index");
        let index = FuzzyIndex::build(&docs(), &path, FuzzyOptions::default()).unwrap();

        let hits = index.search("retreival", 5).unwrap();
        assert!(hits.iter().any(|(ordinal, _)| *ordinal == 0));

        let hits = index.search("dirctory", 5).unwrap();
        assert!(hits.iter().any(|(ordinal, _)| *ordinal == 2));
    }

    #[test]
    fn test_empty_query_returns_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fuzzy_index");
        let index = FuzzyIndex::build(&docs(), &path, FuzzyOptions::default()).unwrap();

        assert!(index.search("", 5).unwrap().is_empty());
        assert!(index.search("   ", 5).unwrap().is_empty());
        assert!(index.search("keyword", 0).unwrap().is_empty());
    }

    #[test]
    fn test_open_missing_is_persistence_error() {
        let dir = tempdir().unwrap();
        let err = FuzzyIndex::open(&dir.path().join("absent"), FuzzyOptions::default())
            .unwrap_err();
        assert!(err.is_missing_index());
    }

    #[test]
    fn test_detached_and_deleted_indexes_soft_fail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fuzzy_index");

        let detached = FuzzyIndex::detached(&path, FuzzyOptions::default());
        assert!(detached.search("keyword", 5).unwrap().is_empty());

        let index = FuzzyIndex::build(&docs(), &path, FuzzyOptions::default()).unwrap();
        std::fs::remove_dir_all(&path).unwrap();
        assert!(index.search("keyword", 5).unwrap().is_empty());
    }

    #[test]
    fn test_reopen_existing_index() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fuzzy_index");
        let built = FuzzyIndex::build(&docs(), &path, FuzzyOptions::default()).unwrap();
        let expected = built.search("swap index", 3).unwrap();
        drop(built);

        assert!(FuzzyIndex::exists(&path));
        let opened = FuzzyIndex::open(&path, FuzzyOptions::default()).unwrap();
        assert_eq!(opened.search("swap index", 3).unwrap(), expected);
    }

    #[test]
    fn test_rebuild_wipes_previous_documents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fuzzy_index");
        FuzzyIndex::build(&docs(), &path, FuzzyOptions::default()).unwrap();

        let rebuilt =
            FuzzyIndex::build(&["only gardening here"], &path, FuzzyOptions::default()).unwrap();
        assert_eq!(rebuilt.num_docs(), 1);
        assert!(rebuilt.search("keyword", 5).unwrap().is_empty());
        assert_eq!(rebuilt.search("gardening", 5).unwrap()[0].0, 0);
    }
}
