//! BM25 keyword scoring for CodeQA.
//!
//! The keyword index is the exact-match half of the lexical side of hybrid
//! retrieval. Documents are identified by their ordinal position in the
//! corpus snapshot they were built from.
//!
//! # Example
//!
//! ```
//! use codeqa_lexical::KeywordIndex;
//!
//! let index = KeywordIndex::build(&["the cat sat", "the dog ran"]);
//! let hits = index.search("cat", 5);
//! assert_eq!(hits[0].0, 0);
//! ```

pub mod bm25;
pub mod tokenize;

pub use bm25::{Bm25Params, KeywordData, KeywordIndex};
pub use tokenize::tokenize;
