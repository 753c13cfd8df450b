//! Shared helpers for turning tool results into next-turn content.
//!
//! The per-dialect message shapes live with each adapter; this module holds
//! the parts they agree on: string rendering and output compaction.

use serde_json::Value;

/// Tools whose output is already compact and structured.
pub const STRUCTURED_TOOLS: &[&str] = &[
    "read_file",
    "write_file",
    "list_files",
    "search_knowledge_base",
    "search_notes",
    "create_note",
    "update_note",
];

/// Maximum characters of a compacted result.
pub const MAX_RESULT_CHARS: usize = 8_000;

/// Appended when a compacted result was cut short.
pub const ELISION_MARKER: &str = "\n…[output truncated]";

/// Render a result as message text: strings verbatim, anything else as JSON.
pub fn stringify(result: &Value) -> String {
    match result {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Bound the output of tools outside the structured allow-list.
pub fn compact(tool_name: &str, result: Value) -> Value {
    if STRUCTURED_TOOLS.contains(&tool_name) {
        return result;
    }
    Value::String(truncate_chars(&summarize(&result), MAX_RESULT_CHARS))
}

/// Human-readable rendering: pretty JSON for containers, text otherwise.
fn summarize(result: &Value) -> String {
    match result {
        Value::String(s) => s.clone(),
        Value::Null => "(no output)".to_string(),
        Value::Object(_) | Value::Array(_) => {
            serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string())
        }
        other => other.to_string(),
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((cut, _)) => format!("{}{ELISION_MARKER}", &text[..cut]),
    }
}
