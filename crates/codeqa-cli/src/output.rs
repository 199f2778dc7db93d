//! Output formatting for search results and index status.
//!
//! Supports both human-readable terminal output and JSON for scripting.

use codeqa_index::{Freshness, IndexStatus, ScoredDocument, SourceMetadata};
use serde::Serialize;

/// Maximum characters to show in a text snippet.
const SNIPPET_MAX_LEN: usize = 200;

// ============================================================================
// Search results
// ============================================================================

#[derive(Serialize)]
struct SearchOutput<'a> {
    query: &'a str,
    results: &'a [ScoredDocument],
}

/// Formats search results as JSON.
pub fn format_search_json(query: &str, results: &[ScoredDocument]) -> String {
    to_json(&SearchOutput { query, results })
}

/// Formats search results for human-readable terminal output.
pub fn format_search_human(query: &str, results: &[ScoredDocument]) -> String {
    if results.is_empty() {
        return format!("No results found for \"{query}\"");
    }

    let mut output = format!(
        "Found {} document{} for \"{query}\":\n\n",
        results.len(),
        plural(results.len())
    );
    for (i, result) in results.iter().enumerate() {
        output.push_str(&format!(
            "{}. #{} (score: {:.4})\n   {}\n\n",
            i + 1,
            result.ordinal,
            result.score,
            indent_text(&truncate_text(&result.text, SNIPPET_MAX_LEN), "   ")
        ));
    }
    output.trim_end().to_string()
}

// ============================================================================
// Index status
// ============================================================================

#[derive(Serialize)]
struct StatusOutput<'a> {
    id: &'a str,
    #[serde(flatten)]
    status: &'a IndexStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'a SourceMetadata>,
}

/// Formats served indices as JSON.
pub fn format_sources_json(sources: &[SourceMetadata]) -> String {
    to_json(&sources)
}

/// Formats served indices as a list.
pub fn format_sources_human(sources: &[SourceMetadata]) -> String {
    if sources.is_empty() {
        return "No indices found.".to_string();
    }

    let mut output = String::new();
    for source in sources {
        output.push_str(&format!(
            "{} ({}): {} document{}\n",
            source.id,
            source.name,
            source.total_chunks,
            plural(source.total_chunks)
        ));
        if !source.path.is_empty() {
            output.push_str(&format!("   Path: {}\n", source.path));
        }
        if !source.description.is_empty() {
            output.push_str(&format!("   {}\n", source.description));
        }
    }
    output.trim_end().to_string()
}

/// Formats one index's status as JSON.
pub fn format_status_json(
    id: &str,
    status: &IndexStatus,
    source: Option<&SourceMetadata>,
) -> String {
    to_json(&StatusOutput { id, status, source })
}

/// Formats one index's status for the terminal.
pub fn format_status_human(
    id: &str,
    status: &IndexStatus,
    source: Option<&SourceMetadata>,
) -> String {
    let mut lines = vec![
        format!("Index:     {id}"),
        format!("Ready:     {}", if status.ready { "yes" } else { "no" }),
        format!("Documents: {}", status.document_count),
    ];
    if let Some(dimension) = status.dimension {
        lines.push(format!("Dimension: {dimension}"));
    }
    lines.push(format!("Model:     {}", status.model));
    if let Some(source) = source {
        lines.push(format!("Name:      {}", source.name));
        if !source.path.is_empty() {
            lines.push(format!("Source:    {}", source.path));
        }
    }
    lines.join("\n")
}

/// Formats a freshness report.
pub fn format_freshness(id: &str, freshness: &Freshness) -> String {
    if freshness.fresh {
        return format!("Index '{id}' is fresh.");
    }
    let mut output = format!("Index '{id}' is stale; the next load rebuilds its dense index:");
    for reason in &freshness.reasons {
        output.push_str(&format!("\n  - {reason}"));
    }
    output
}

// ============================================================================
// Helpers
// ============================================================================

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}

/// Truncates text to at most `max_len` bytes on a word boundary, adding an ellipsis.
fn truncate_text(text: &str, max_len: usize) -> String {
    let text = text.trim();
    if text.len() <= max_len {
        return text.to_string();
    }
    let mut end = max_len;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let truncated = &text[..end];
    match truncated.rfind(' ') {
        Some(last_space) => format!("{}...", &truncated[..last_space]),
        None => format!("{truncated}..."),
    }
}

/// Indents all lines of text after the first line.
fn indent_text(text: &str, indent: &str) -> String {
    text.lines()
        .enumerate()
        .map(|(i, line)| {
            if i == 0 {
                line.to_string()
            } else {
                format!("{indent}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn result(ordinal: usize, text: &str, score: f32) -> ScoredDocument {
        ScoredDocument {
            ordinal,
            text: text.to_string(),
            score,
        }
    }

    fn source() -> SourceMetadata {
        SourceMetadata {
            id: "pets".to_string(),
            name: "Pet care".to_string(),
            description: String::new(),
            path: "/data/pets.json".to_string(),
            total_chunks: 1,
        }
    }

    #[test]
    fn test_format_search_human_empty() {
        assert_eq!(format_search_human("cat", &[]), "No results found for \"cat\"");
    }

    #[test]
    fn test_format_search_human() {
        let output = format_search_human("cat", &[result(2, "cats purr", 0.0164)]);
        assert!(output.starts_with("Found 1 document for \"cat\""));
        assert!(output.contains("1. #2 (score: 0.0164)"));
        assert!(output.contains("cats purr"));
    }

    #[test]
    fn test_format_search_json() {
        let output = format_search_json("cat", &[result(0, "cats", 0.5)]);
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["query"], "cat");
        assert_eq!(value["results"][0]["ordinal"], 0);
        assert_eq!(value["results"][0]["text"], "cats");
    }

    #[test]
    fn test_format_sources() {
        assert_eq!(format_sources_human(&[]), "No indices found.");
        let output = format_sources_human(&[source()]);
        assert!(output.starts_with("pets (Pet care): 1 document"));
        assert!(output.contains("Path: /data/pets.json"));
    }

    #[test]
    fn test_format_status_json_flattens_status() {
        let status = IndexStatus {
            ready: true,
            document_count: 3,
            dimension: Some(16),
            model: "mock".to_string(),
        };
        let source = source();
        let output = format_status_json("pets", &status, Some(&source));
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["id"], "pets");
        assert_eq!(value["document_count"], 3);
        assert_eq!(value["source"]["name"], "Pet care");
    }

    #[test]
    fn test_format_freshness() {
        let fresh = Freshness {
            fresh: true,
            reasons: Vec::new(),
        };
        assert_eq!(format_freshness("a", &fresh), "Index 'a' is fresh.");

        let stale = Freshness {
            fresh: false,
            reasons: vec!["corpus checksum mismatch".to_string()],
        };
        assert!(format_freshness("a", &stale).ends_with("- corpus checksum mismatch"));
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("  short  ", 20), "short");
        assert_eq!(truncate_text("hello wide world", 12), "hello wide...");
        assert_eq!(truncate_text("abcdef", 3), "abc...");
    }

    #[test]
    fn test_truncate_text_respects_char_boundaries() {
        let text = "ééééé";
        assert_eq!(truncate_text(text, 3), "é...");
    }
}
