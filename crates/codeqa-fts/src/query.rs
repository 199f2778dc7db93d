//! Query construction for the fuzzy index.
//!
//! Each analyzed query token becomes an exact BM25 term query OR-ed with a
//! fuzzy term query (for tokens long enough to tolerate edits). All tokens
//! are OR-ed together, so any matching token is enough to surface a document.
//!
//! # Example
//!
//! ```
//! use codeqa_fts::{FuzzyOptions, FuzzySchema, QueryBuilder};
//!
//! let schema = FuzzySchema::build();
//! let builder = QueryBuilder::new(&schema, FuzzyOptions::default());
//! assert!(builder.build_query("retreival pipeline").is_some());
//! assert!(builder.build_query("   ").is_none());
//! ```

use tantivy::Term;
use tantivy::query::{BooleanQuery, FuzzyTermQuery, Occur, Query, TermQuery};
use tantivy::schema::IndexRecordOption;

use crate::schema::{FuzzySchema, analyze};
use crate::types::FuzzyOptions;

/// Largest edit distance Tantivy builds automata for.
const MAX_DISTANCE: u8 = 2;

/// Builds OR-combined fuzzy queries over the `content` field.
pub struct QueryBuilder<'a> {
    schema: &'a FuzzySchema,
    options: FuzzyOptions,
}

impl<'a> QueryBuilder<'a> {
    /// Create a new query builder.
    pub fn new(schema: &'a FuzzySchema, options: FuzzyOptions) -> Self {
        Self { schema, options }
    }

    /// Build a query from a search string.
    ///
    /// Returns `None` when the string has no indexable tokens.
    pub fn build_query(&self, query_str: &str) -> Option<Box<dyn Query>> {
        let mut tokens = analyze(query_str);
        let mut seen = std::collections::HashSet::new();
        tokens.retain(|t| seen.insert(t.clone()));

        if tokens.is_empty() {
            return None;
        }

        let clauses: Vec<(Occur, Box<dyn Query>)> = tokens
            .iter()
            .map(|token| (Occur::Should, self.token_query(token)))
            .collect();

        Some(Box::new(BooleanQuery::new(clauses)))
    }

    fn token_query(&self, token: &str) -> Box<dyn Query> {
        let term = Term::from_field_text(self.schema.content, token);
        let exact: Box<dyn Query> = Box::new(TermQuery::new(
            term.clone(),
            IndexRecordOption::WithFreqs,
        ));

        if !self.is_fuzzy_candidate(token) {
            return exact;
        }

        let fuzzy: Box<dyn Query> = Box::new(FuzzyTermQuery::new(
            term,
            self.options.distance.min(MAX_DISTANCE),
            true, // transposition
        ));
        Box::new(BooleanQuery::new(vec![
            (Occur::Should, exact),
            (Occur::Should, fuzzy),
        ]))
    }

    fn is_fuzzy_candidate(&self, token: &str) -> bool {
        self.options.distance > 0 && token.chars().count() >= self.options.min_term_len
    }
}

// ============================================================================
// Tests
// ============================================================================
