//! Fuzzy matching options.

use serde::{Deserialize, Serialize};

fn default_distance() -> u8 {
    1
}

fn default_min_term_len() -> usize {
    4
}

/// Options controlling how query terms are expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuzzyOptions {
    /// Maximum Levenshtein distance for fuzzy term matches.
    #[serde(default = "default_distance")]
    pub distance: u8,

    /// Terms shorter than this are matched exactly only.
    #[serde(default = "default_min_term_len")]
    pub min_term_len: usize,
}

impl Default for FuzzyOptions {
    fn default() -> Self {
        Self {
            distance: default_distance(),
            min_term_len: default_min_term_len(),
        }
    }
}
