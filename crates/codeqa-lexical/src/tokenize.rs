//! Query and document tokenization.

/// Lowercase `text` and split it on whitespace.
///
/// No stemming and no punctuation stripping: `"Cat,"` and `"cat"` are
/// different tokens. Queries and documents must go through the same function.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}
