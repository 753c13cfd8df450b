//! Per-round decoder state shared by every dialect.
//!
//! Streaming providers deliver tool calls in fragments: an id here, a name
//! there, the arguments split across many frames. [`StreamDecoderState`]
//! merges those fragments by index; [`tool_calls`] materializes whatever is
//! complete enough to show or run.

use convoy_core::provider::ProviderKind;
use convoy_core::tool::ToolCall;
use std::collections::BTreeMap;

/// A tool call still being assembled from stream fragments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialCall {
    pub id: String,
    pub name: String,
    pub raw_arguments: String,
}

/// Everything decoded so far for one in-flight model turn.
///
/// Created fresh for each round and dropped when the round ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDecoderState {
    pub provider: ProviderKind,
    /// Partial calls keyed by the provider's index, in index order.
    pub tool_calls: BTreeMap<u32, PartialCall>,
    pub accumulated_text: String,
    pub finish_reason: Option<String>,
    /// The provider signalled that the collected calls should be executed.
    pub is_complete: bool,
}

impl StreamDecoderState {
    pub fn new(provider: ProviderKind) -> Self {
        Self {
            provider,
            tool_calls: BTreeMap::new(),
            accumulated_text: String::new(),
            finish_reason: None,
            is_complete: false,
        }
    }

    /// Append a text fragment. Returns the fragment when it is non-empty.
    pub fn push_text(&mut self, text: &str) -> Option<String> {
        if text.is_empty() {
            return None;
        }
        self.accumulated_text.push_str(text);
        Some(text.to_string())
    }

    /// Merge identity fragments for the call at `index`.
    ///
    /// The first non-blank id and name win; later blank or absent values
    /// never clear them.
    pub fn start_call(&mut self, index: u32, id: Option<&str>, name: Option<&str>) {
        let call = self.tool_calls.entry(index).or_default();
        if let Some(id) = id.filter(|s| !s.trim().is_empty()) {
            if call.id.is_empty() {
                call.id = id.to_string();
            }
        }
        if let Some(name) = name.filter(|s| !s.trim().is_empty()) {
            if call.name.is_empty() {
                call.name = name.to_string();
            }
        }
    }

    /// Append an argument fragment to the call at `index`.
    pub fn append_args(&mut self, index: u32, fragment: &str) {
        self.tool_calls
            .entry(index)
            .or_default()
            .raw_arguments
            .push_str(fragment);
    }

    /// Add a call that arrives whole (Gemini, Ollama) at the next free index.
    pub fn push_whole_call(&mut self, id: Option<&str>, name: &str, args: &serde_json::Value) {
        let index = self.next_index();
        let id = match id {
            Some(id) if !id.trim().is_empty() => id.to_string(),
            _ => format!("call_{index}"),
        };
        self.start_call(index, Some(&id), Some(name));
        let raw = match args {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        };
        self.append_args(index, &raw);
    }

    /// Record a finish reason; completes the state when it is one of `tool_reasons`.
    pub fn finish(&mut self, reason: &str, tool_reasons: &[&str]) {
        self.finish_reason = Some(reason.to_string());
        if tool_reasons.contains(&reason) {
            self.is_complete = true;
        }
    }

    pub fn has_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    fn next_index(&self) -> u32 {
        self.tool_calls
            .keys()
            .next_back()
            .map(|i| i + 1)
            .unwrap_or(0)
    }
}

/// Materialize every call whose name is known.
///
/// Pure: the same state always yields the same calls, so it is safe to poll
/// mid-stream for progress display. Arguments that do not parse yet become
/// `{}` with the raw buffer kept in `raw_args`.
pub fn tool_calls(state: &StreamDecoderState) -> Vec<ToolCall> {
    state
        .tool_calls
        .iter()
        .filter(|(_, partial)| !partial.name.is_empty())
        .map(|(index, partial)| {
            let id = if partial.id.is_empty() {
                format!("call_{index}")
            } else {
                partial.id.clone()
            };
            let mut call = ToolCall::new(id, &partial.name, empty_args(), state.provider);
            match parse_args(&partial.raw_arguments) {
                Some(args) => call.args = args,
                None => {
                    call.partial_args = parse_prefix(&partial.raw_arguments);
                    call.raw_args = Some(partial.raw_arguments.clone());
                }
            }
            call
        })
        .collect()
}

fn empty_args() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

// A call with no arguments at all is a call with empty arguments.
fn parse_args(raw: &str) -> Option<serde_json::Value> {
    if raw.trim().is_empty() {
        return Some(empty_args());
    }
    serde_json::from_str::<serde_json::Value>(raw).ok()
}

/// Best-effort parse of a truncated JSON object, for progress display.
///
/// Closes an open string and any open containers. If that does not parse,
/// retries up to the last comma, dropping the half-written member after it.
fn parse_prefix(raw: &str) -> Option<serde_json::Value> {
    let mut closers: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut last_comma: Option<(usize, Vec<char>)> = None;

    for (i, c) in raw.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => closers.push('}'),
            '[' => closers.push(']'),
            '}' | ']' => {
                closers.pop();
            }
            ',' => last_comma = Some((i, closers.clone())),
            _ => {}
        }
    }

    let mut body = raw.to_string();
    if in_string {
        if escaped {
            body.pop();
        }
        body.push('"');
    }
    if let Some(value) = close_and_parse(body, &closers) {
        return Some(value);
    }
    let (cut, closers) = last_comma?;
    close_and_parse(raw[..cut].to_string(), &closers)
}

fn close_and_parse(mut body: String, closers: &[char]) -> Option<serde_json::Value> {
    body.extend(closers.iter().rev());
    serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .filter(serde_json::Value::is_object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn id_and_name_are_set_once() {
        let mut state = StreamDecoderState::new(ProviderKind::OpenAi);
        state.start_call(0, Some("call_a"), Some("lookup"));
        state.start_call(0, Some(""), None);
        state.start_call(0, Some("call_b"), Some("other"));
        let call = &state.tool_calls[&0];
        assert_eq!(call.id, "call_a");
        assert_eq!(call.name, "lookup");
    }

    #[test]
    fn incomplete_arguments_keep_raw_buffer() {
        let mut state = StreamDecoderState::new(ProviderKind::OpenAi);
        state.start_call(0, Some("c1"), Some("f"));
        state.append_args(0, r#"{"a":"#);

        let calls = tool_calls(&state);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].args, json!({}));
        assert_eq!(calls[0].raw_args.as_deref(), Some(r#"{"a":"#));

        state.append_args(0, "1}");
        let calls = tool_calls(&state);
        assert_eq!(calls[0].args, json!({"a": 1}));
        assert!(calls[0].raw_args.is_none());
    }

    #[test]
    fn partial_arguments_are_parsed_best_effort() {
        let mut state = StreamDecoderState::new(ProviderKind::Anthropic);
        state.start_call(0, Some("w"), Some("write_file"));
        state.append_args(0, r#"{"path":"a.md","content":"hel"#);
        let calls = tool_calls(&state);
        assert_eq!(calls[0].args, json!({}));
        assert_eq!(
            calls[0].partial_args,
            Some(json!({"path": "a.md", "content": "hel"}))
        );

        let mut state = StreamDecoderState::new(ProviderKind::OpenAi);
        state.start_call(0, Some("c"), Some("search"));
        state.append_args(0, r#"{"tags":["a","b"],"li"#);
        assert_eq!(
            tool_calls(&state)[0].partial_args,
            Some(json!({"tags": ["a", "b"]}))
        );

        state.append_args(0, r#"mit":3}"#);
        let calls = tool_calls(&state);
        assert_eq!(calls[0].args, json!({"tags": ["a", "b"], "limit": 3}));
        assert!(calls[0].partial_args.is_none());
    }

    #[test]
    fn unusable_prefix_has_no_partial_arguments() {
        let mut state = StreamDecoderState::new(ProviderKind::OpenAi);
        state.start_call(0, Some("c"), Some("f"));
        state.append_args(0, r#"{"a":"#);
        assert!(tool_calls(&state)[0].partial_args.is_none());
    }

    #[test]
    fn nameless_calls_are_not_materialized() {
        let mut state = StreamDecoderState::new(ProviderKind::OpenAi);
        state.append_args(0, "{}");
        assert!(tool_calls(&state).is_empty());
        state.start_call(0, None, Some("f"));
        assert_eq!(tool_calls(&state).len(), 1);
    }

    #[test]
    fn materialization_is_idempotent() {
        let mut state = StreamDecoderState::new(ProviderKind::Anthropic);
        state.start_call(0, Some("x"), Some("g"));
        state.append_args(0, r#"{"b":2"#);
        state.start_call(3, Some("y"), Some("h"));
        state.append_args(3, r#"{"c":[1,2]}"#);

        let first = tool_calls(&state);
        let second = tool_calls(&state);
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_eq!(first[1].args, json!({"c": [1, 2]}));
    }

    #[test]
    fn whole_calls_take_next_free_index() {
        let mut state = StreamDecoderState::new(ProviderKind::Gemini);
        state.push_whole_call(None, "a", &json!({"x": 1}));
        state.push_whole_call(None, "b", &json!({}));
        let calls = tool_calls(&state);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_0");
        assert_eq!(calls[1].name, "b");
        assert_eq!(calls[0].args, json!({"x": 1}));
    }

    #[test]
    fn finish_only_completes_on_tool_reasons() {
        let mut state = StreamDecoderState::new(ProviderKind::OpenAi);
        state.finish("stop", &["tool_calls"]);
        assert_eq!(state.finish_reason.as_deref(), Some("stop"));
        assert!(!state.is_complete);
        state.finish("tool_calls", &["tool_calls"]);
        assert!(state.is_complete);
    }
}
