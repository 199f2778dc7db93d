//! Tantivy schema and analyzer for the fuzzy index.
//!
//! Two fields: `doc_id` (raw string, stored) carries the document ordinal,
//! and `content` (analyzed, not stored) carries the text.

use codeqa_core::{Error, Result};
use tantivy::Index;
use tantivy::schema::{
    Field, IndexRecordOption, STORED, STRING, Schema, TextFieldIndexing, TextOptions,
};
use tantivy::tokenizer::{LowerCaser, RemoveLongFilter, SimpleTokenizer, TextAnalyzer, TokenStream};

/// Name under which the content analyzer is registered on every index.
pub const TOKENIZER_NAME: &str = "codeqa_text";

/// Tokens longer than this are dropped at index and query time.
const MAX_TOKEN_LEN: usize = 40;

/// Field handles for the fuzzy index schema.
#[derive(Debug, Clone)]
pub struct FuzzySchema {
    schema: Schema,
    /// Stored ordinal of the document, as a string.
    pub doc_id: Field,
    /// Analyzed document text.
    pub content: Field,
}

impl FuzzySchema {
    /// Build a fresh schema.
    pub fn build() -> Self {
        let mut builder = Schema::builder();
        let doc_id = builder.add_text_field("doc_id", STRING | STORED);

        let indexing = TextFieldIndexing::default()
            .set_tokenizer(TOKENIZER_NAME)
            .set_index_option(IndexRecordOption::WithFreqsAndPositions);
        let content = builder.add_text_field(
            "content",
            TextOptions::default().set_indexing_options(indexing),
        );

        Self {
            schema: builder.build(),
            doc_id,
            content,
        }
    }

    /// Resolve field handles from the schema of an existing index.
    pub fn from_index(index: &Index) -> Result<Self> {
        let schema = index.schema();
        let doc_id = schema
            .get_field("doc_id")
            .map_err(|e| Error::invalid_data(format!("Fuzzy index has no doc_id field: {e}")))?;
        let content = schema
            .get_field("content")
            .map_err(|e| Error::invalid_data(format!("Fuzzy index has no content field: {e}")))?;
        Ok(Self {
            schema,
            doc_id,
            content,
        })
    }

    /// The Tantivy schema.
    pub fn schema(&self) -> Schema {
        self.schema.clone()
    }

    /// Register the content analyzer on `index`.
    pub fn register_tokenizers(index: &Index) {
        index.tokenizers().register(TOKENIZER_NAME, analyzer());
    }
}

/// The analyzer used for the `content` field.
pub fn analyzer() -> TextAnalyzer {
    TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(MAX_TOKEN_LEN))
        .filter(LowerCaser)
        .build()
}

/// Run `text` through the content analyzer.
pub fn analyze(text: &str) -> Vec<String> {
    let mut analyzer = analyzer();
    let mut tokens = Vec::new();
    let mut stream = analyzer.token_stream(text);
    while let Some(token) = stream.next() {
        tokens.push(token.text.clone());
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_fields() {
        let schema = FuzzySchema::build();
        let tantivy_schema = schema.schema();
        assert_eq!(tantivy_schema.get_field("doc_id").unwrap(), schema.doc_id);
        assert_eq!(tantivy_schema.get_field("content").unwrap(), schema.content);
    }

    #[test]
    fn test_from_index_resolves_fields() {
        let schema = FuzzySchema::build();
        let index = Index::create_in_ram(schema.schema());
        let resolved = FuzzySchema::from_index(&index).unwrap();
        assert_eq!(resolved.doc_id, schema.doc_id);
        assert_eq!(resolved.content, schema.content);
    }

    #[test]
    fn test_analyze_lowercases_and_splits_punctuation() {
        assert_eq!(analyze("HashMap::insert(key)"), vec!["hashmap", "insert", "key"]);
    }

    #[test]
    fn test_analyze_drops_long_tokens() {
        let long = "x".repeat(MAX_TOKEN_LEN + 5);
        assert_eq!(analyze(&format!("short {long}")), vec!["short"]);
    }
}
