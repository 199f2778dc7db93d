//! Fuzzy inverted index for CodeQA.
//!
//! This crate wraps a Tantivy index over the corpus snapshot so that
//! misspelled query terms still find their documents. It is a recall
//! booster next to the BM25 keyword index: a missing index or an empty
//! query yields no hits rather than an error.
//!
//! Each document is stored under a string id equal to its ordinal in the
//! corpus snapshot, so hits join back to the dense and BM25 indexes.

pub mod fuzzy_index;
pub mod query;
pub mod schema;
pub mod types;

pub use fuzzy_index::FuzzyIndex;
pub use query::QueryBuilder;
pub use schema::FuzzySchema;
pub use types::FuzzyOptions;
