//! BM25 keyword index.
//!
//! Scores are the classic Okapi BM25 sum over query tokens:
//!
//! ```text
//! idf(t) * tf * (k1 + 1) / (tf + k1 * (1 - b + b * dl / avgdl))
//! idf(t) = ln((N - df + 0.5) / (df + 0.5) + 1)
//! ```
//!
//! The index is fully described by the tokenized documents plus
//! [`KeywordData`], which is what gets persisted.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::tokenize::tokenize;

// ============================================================================
// Parameters
// ============================================================================

fn default_k1() -> f64 {
    1.5
}

fn default_b() -> f64 {
    0.75
}

/// BM25 tuning parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    /// Term-frequency saturation.
    #[serde(default = "default_k1")]
    pub k1: f64,

    /// Length normalization strength.
    #[serde(default = "default_b")]
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: default_k1(),
            b: default_b(),
        }
    }
}

// ============================================================================
// Persisted form
// ============================================================================

/// Corpus statistics persisted next to the tokenized documents.
///
/// Every field has a default so partially written files still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordData {
    /// Inverse document frequency per token.
    #[serde(default)]
    pub idf: BTreeMap<String, f64>,

    /// Token count per document, in corpus order.
    #[serde(default)]
    pub doc_lengths: Vec<usize>,

    /// Mean token count per document.
    #[serde(default)]
    pub avgdl: f64,

    /// Term-frequency saturation.
    #[serde(default = "default_k1")]
    pub k1: f64,

    /// Length normalization strength.
    #[serde(default = "default_b")]
    pub b: f64,
}

impl Default for KeywordData {
    fn default() -> Self {
        Self {
            idf: BTreeMap::new(),
            doc_lengths: Vec::new(),
            avgdl: 0.0,
            k1: default_k1(),
            b: default_b(),
        }
    }
}

// ============================================================================
// KeywordIndex
// ============================================================================

/// In-memory BM25 index over an ordered corpus snapshot.
#[derive(Debug, Clone)]
pub struct KeywordIndex {
    tokenized_docs: Vec<Vec<String>>,
    term_freqs: Vec<HashMap<String, u32>>,
    idf: HashMap<String, f64>,
    doc_lengths: Vec<usize>,
    avgdl: f64,
    params: Bm25Params,
}

impl KeywordIndex {
    /// Build an index with default parameters.
    pub fn build<S: AsRef<str>>(texts: &[S]) -> Self {
        Self::build_with_params(texts, Bm25Params::default())
    }

    /// Build an index with explicit parameters.
    pub fn build_with_params<S: AsRef<str>>(texts: &[S], params: Bm25Params) -> Self {
        let tokenized_docs: Vec<Vec<String>> =
            texts.iter().map(|t| tokenize(t.as_ref())).collect();

        let mut doc_freq: HashMap<&str, usize> = HashMap::new();
        let mut doc_lengths = Vec::with_capacity(tokenized_docs.len());
        for tokens in &tokenized_docs {
            doc_lengths.push(tokens.len());
            let mut seen: Vec<&str> = tokens.iter().map(String::as_str).collect();
            seen.sort_unstable();
            seen.dedup();
            for token in seen {
                *doc_freq.entry(token).or_insert(0) += 1;
            }
        }

        let num_docs = tokenized_docs.len().max(1) as f64;
        let avgdl = if doc_lengths.is_empty() {
            0.0
        } else {
            doc_lengths.iter().sum::<usize>() as f64 / num_docs
        };

        let idf = doc_freq
            .into_iter()
            .map(|(token, df)| {
                let df = df as f64;
                let value = ((num_docs - df + 0.5) / (df + 0.5) + 1.0).ln();
                (token.to_string(), value)
            })
            .collect();

        log::debug!(
            "Built BM25 index: {} documents, avgdl {:.2}",
            tokenized_docs.len(),
            avgdl
        );

        let term_freqs = count_terms(&tokenized_docs);
        Self {
            tokenized_docs,
            term_freqs,
            idf,
            doc_lengths,
            avgdl,
            params,
        }
    }

    /// Restore an index from persisted tokens and statistics.
    pub fn from_persisted(tokenized_docs: Vec<Vec<String>>, data: KeywordData) -> Self {
        let term_freqs = count_terms(&tokenized_docs);
        Self {
            tokenized_docs,
            term_freqs,
            idf: data.idf.into_iter().collect(),
            doc_lengths: data.doc_lengths,
            avgdl: data.avgdl,
            params: Bm25Params {
                k1: data.k1,
                b: data.b,
            },
        }
    }

    /// Statistics to persist alongside [`Self::tokenized_docs`].
    pub fn to_persisted(&self) -> KeywordData {
        KeywordData {
            idf: self
                .idf
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            doc_lengths: self.doc_lengths.clone(),
            avgdl: self.avgdl,
            k1: self.params.k1,
            b: self.params.b,
        }
    }

    /// Top `k` documents for `query` as `(ordinal, score)`, best first.
    ///
    /// Documents that share no token with the query are omitted. Ties keep
    /// corpus order. An empty query or empty corpus yields no hits.
    pub fn search(&self, query: &str, k: usize) -> Vec<(usize, f32)> {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() || self.tokenized_docs.is_empty() || k == 0 {
            return Vec::new();
        }

        let mut scores: Vec<(usize, f64)> = (0..self.tokenized_docs.len())
            .map(|ordinal| (ordinal, self.score_doc(ordinal, &query_tokens)))
            .filter(|(_, score)| *score > 0.0)
            .collect();

        scores.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scores.truncate(k);

        scores
            .into_iter()
            .map(|(ordinal, score)| (ordinal, score as f32))
            .collect()
    }

    fn score_doc(&self, ordinal: usize, query_tokens: &[String]) -> f64 {
        let freqs = &self.term_freqs[ordinal];
        let doc_len = self
            .doc_lengths
            .get(ordinal)
            .copied()
            .unwrap_or_else(|| self.tokenized_docs[ordinal].len());
        if doc_len == 0 {
            return 0.0;
        }

        let avgdl = if self.avgdl == 0.0 { 1.0 } else { self.avgdl };
        let Bm25Params { k1, b } = self.params;
        let mut score = 0.0;
        for token in query_tokens {
            let Some(&tf) = freqs.get(token) else {
                continue;
            };
            let tf = f64::from(tf);
            let idf = self.idf.get(token).copied().unwrap_or(0.0);
            let numerator = tf * (k1 + 1.0);
            let denominator = tf + k1 * (1.0 - b + b * (doc_len as f64 / avgdl));
            score += idf * numerator / denominator;
        }
        score
    }

    /// Tokenized documents, in corpus order.
    pub fn tokenized_docs(&self) -> &[Vec<String>] {
        &self.tokenized_docs
    }

    /// BM25 parameters in effect.
    pub fn params(&self) -> Bm25Params {
        self.params
    }

    /// Mean document length in tokens.
    pub fn avgdl(&self) -> f64 {
        self.avgdl
    }

    /// Inverse document frequency of `token`, if it occurs in the corpus.
    pub fn idf(&self, token: &str) -> Option<f64> {
        self.idf.get(token).copied()
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.tokenized_docs.len()
    }

    /// Whether the index holds no documents.
    pub fn is_empty(&self) -> bool {
        self.tokenized_docs.is_empty()
    }
}

fn count_terms(tokenized_docs: &[Vec<String>]) -> Vec<HashMap<String, u32>> {
    tokenized_docs
        .iter()
        .map(|tokens| {
            let mut freq = HashMap::new();
            for token in tokens {
                *freq.entry(token.clone()).or_insert(0) += 1;
            }
            freq
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<&'static str> {
        vec!["the cat sat", "the dog ran", "cats and dogs"]
    }

    #[test]
    fn test_build_statistics() {
        let index = KeywordIndex::build(&corpus());
        assert_eq!(index.len(), 3);
        assert!((index.avgdl() - 3.0).abs() < 1e-9);

        // "the" appears in 2 of 3 documents
        let expected = ((3.0_f64 - 2.0 + 0.5) / (2.0 + 0.5) + 1.0).ln();
        assert!((index.idf("the").unwrap() - expected).abs() < 1e-9);

        // "cat" appears once
        let expected = ((3.0_f64 - 1.0 + 0.5) / (1.0 + 0.5) + 1.0).ln();
        assert!((index.idf("cat").unwrap() - expected).abs() < 1e-9);
        assert!(index.idf("bird").is_none());
    }

    #[test]
    fn test_search_ranks_matching_document_first() {
        let index = KeywordIndex::build(&corpus());
        let hits = index.search("cat", 5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, 0);
        assert!(hits[0].1 > 0.0);
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let index = KeywordIndex::build(&corpus());
        assert_eq!(index.search("CAT", 5), index.search("cat", 5));
    }

    #[test]
    fn test_search_omits_zero_scores() {
        let index = KeywordIndex::build(&corpus());
        assert!(index.search("bird", 5).is_empty());
    }

    #[test]
    fn test_search_ties_keep_corpus_order() {
        let index = KeywordIndex::build(&["alpha one", "alpha two", "alpha six"]);
        let hits = index.search("alpha", 3);
        let ordinals: Vec<usize> = hits.iter().map(|(o, _)| *o).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
    }

    #[test]
    fn test_search_truncates_to_k() {
        let index = KeywordIndex::build(&["a b", "a c", "a d", "a e"]);
        assert_eq!(index.search("a", 2).len(), 2);
        assert!(index.search("a", 0).is_empty());
    }

    #[test]
    fn test_empty_query_and_empty_corpus() {
        let index = KeywordIndex::build(&corpus());
        assert!(index.search("", 5).is_empty());
        assert!(index.search("   ", 5).is_empty());

        let empty = KeywordIndex::build::<&str>(&[]);
        assert!(empty.is_empty());
        assert!(empty.search("cat", 5).is_empty());
    }

    #[test]
    fn test_repeated_query_tokens_accumulate() {
        let index = KeywordIndex::build(&corpus());
        let single = index.search("cat", 1)[0].1;
        let double = index.search("cat cat", 1)[0].1;
        assert!((double - 2.0 * single).abs() < 1e-5);
    }

    #[test]
    fn test_higher_term_frequency_scores_higher() {
        let index = KeywordIndex::build(&[
            "rust borrow checker rules apply here",
            "rust borrow checker rust rules here",
            "unrelated text about gardening and soil",
        ]);
        let hits = index.search("rust", 3);
        let score_of = |ordinal: usize| {
            hits.iter()
                .find(|(o, _)| *o == ordinal)
                .map(|(_, s)| *s)
                .unwrap()
        };
        assert!(score_of(1) >= score_of(0));
    }

    #[test]
    fn test_persisted_round_trip_preserves_results() {
        let index = KeywordIndex::build(&corpus());
        let data = index.to_persisted();
        let json = serde_json::to_string(&data).unwrap();

        let restored = KeywordIndex::from_persisted(
            index.tokenized_docs().to_vec(),
            serde_json::from_str(&json).unwrap(),
        );

        for query in ["cat", "the dog", "dogs and cats"] {
            assert_eq!(restored.search(query, 3), index.search(query, 3));
        }
    }

    #[test]
    fn test_keyword_data_defaults() {
        let data: KeywordData = serde_json::from_str(r#"{"avgdl": 2.0}"#).unwrap();
        assert!(data.idf.is_empty());
        assert!(data.doc_lengths.is_empty());
        assert_eq!(data.k1, 1.5);
        assert_eq!(data.b, 0.75);
    }

    #[test]
    fn test_custom_params_are_persisted() {
        let params = Bm25Params { k1: 1.2, b: 0.5 };
        let index = KeywordIndex::build_with_params(&corpus(), params);
        let data = index.to_persisted();
        assert_eq!(data.k1, 1.2);
        assert_eq!(data.b, 0.5);

        let restored = KeywordIndex::from_persisted(index.tokenized_docs().to_vec(), data);
        assert_eq!(restored.params(), params);
    }

    #[test]
    fn test_length_normalization_prefers_shorter_document() {
        let index = KeywordIndex::build(&[
            "cache",
            "cache plus many other unrelated words in this document",
        ]);
        let hits = index.search("cache", 2);
        assert_eq!(hits[0].0, 0);
        assert!(hits[0].1 > hits[1].1);
    }
}
