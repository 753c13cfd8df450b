//! OpenAI-compatible dialect.
//!
//! Works with: OpenAI, OpenRouter, vLLM, Together AI, and any endpoint that
//! exposes `/chat/completions` with SSE streaming.
//!
//! Tool calls stream as deltas keyed by `index`: the id and name usually
//! arrive in the first delta, the arguments as string fragments after it.

use crate::accumulator::StreamDecoderState;
use crate::adapter::{ProviderAdapter, WireConversation, WireMessage};
use crate::decoder::WireEvent;
use crate::encoder::stringify;
use convoy_core::error::ProviderError;
use convoy_core::message::{Message, Role};
use convoy_core::provider::{ProviderConfig, ProviderKind, ToolDefinition};
use convoy_core::tool::ToolCall;
use serde::{Deserialize, Serialize};

/// Finish reasons that mean "run the tools".
const TOOL_FINISH_REASONS: &[&str] = &["tool_calls", "tool_call", "function_call"];

/// Tolerant dialect: roles and `tool_call_id` go through unchanged.
pub struct OpenAiAdapter;

impl OpenAiAdapter {
    fn to_api_message(msg: &Message) -> ChatMessage {
        ChatMessage {
            role: msg.role.as_str().into(),
            content: Some(msg.content.clone()),
            tool_calls: if msg.tool_calls.is_empty() {
                None
            } else {
                Some(
                    msg.tool_calls
                        .iter()
                        .map(|tc| ApiToolCall {
                            id: tc.id.clone(),
                            r#type: "function".into(),
                            function: ApiFunction {
                                name: tc.name.clone(),
                                arguments: tc.arguments.clone(),
                            },
                        })
                        .collect(),
                )
            },
            tool_call_id: msg.tool_call_id.clone(),
        }
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }
}

/// Argument text to send back for a call: the raw buffer if it never
/// parsed, otherwise the parsed object.
pub(crate) fn wire_arguments(call: &ToolCall) -> String {
    match &call.raw_args {
        Some(raw) => raw.clone(),
        None => call.args.to_string(),
    }
}

impl ProviderAdapter for OpenAiAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn endpoint(&self, config: &ProviderConfig) -> String {
        format!("{}/chat/completions", config.base_url)
    }

    fn headers(&self, config: &ProviderConfig) -> Vec<(String, String)> {
        let mut headers = vec![
            ("Content-Type".into(), "application/json".into()),
            ("Accept".into(), "text/event-stream".into()),
        ];
        if !config.api_key.is_empty() {
            headers.push(("Authorization".into(), format!("Bearer {}", config.api_key)));
        }
        headers
    }

    fn format(
        &self,
        window: &[Message],
        system: Option<&str>,
        _pending_prompt: &str,
    ) -> Result<WireConversation, ProviderError> {
        let mut messages = Vec::with_capacity(window.len() + 1);
        if let Some(system) = system.filter(|s| !s.trim().is_empty()) {
            messages.push(WireMessage::OpenAi(Self::to_api_message(&Message::system(system))));
        }
        messages.extend(
            window
                .iter()
                .map(|m| WireMessage::OpenAi(Self::to_api_message(m))),
        );
        Ok(WireConversation {
            system: None,
            messages,
        })
    }

    fn build_body(
        &self,
        config: &ProviderConfig,
        conversation: &WireConversation,
        tools: &[ToolDefinition],
        json_mode: bool,
    ) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": config.model,
            "messages": conversation.messages,
            "temperature": config.temperature,
            "stream": true,
        });

        if !tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(tools));
        }

        if json_mode {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }

        body
    }

    fn parse_event(&self, data: &str) -> Result<WireEvent, serde_json::Error> {
        serde_json::from_str::<StreamChunk>(data).map(WireEvent::OpenAi)
    }

    fn encode_invocation(&self, text: &str, calls: &[ToolCall]) -> WireMessage {
        WireMessage::OpenAi(ChatMessage {
            role: Role::Assistant.as_str().into(),
            content: (!text.is_empty()).then(|| text.to_string()),
            tool_calls: Some(
                calls
                    .iter()
                    .map(|call| ApiToolCall {
                        id: call.id.clone(),
                        r#type: "function".into(),
                        function: ApiFunction {
                            name: call.name.clone(),
                            arguments: wire_arguments(call),
                        },
                    })
                    .collect(),
            ),
            tool_call_id: None,
        })
    }

    fn encode_result(&self, call: &ToolCall, result: &serde_json::Value) -> WireMessage {
        WireMessage::OpenAi(ChatMessage {
            role: Role::Tool.as_str().into(),
            content: Some(stringify(result)),
            tool_calls: None,
            tool_call_id: Some(call.id.clone()),
        })
    }
}

/// Fold one streamed chunk into the round state.
pub(crate) fn apply(
    state: &mut StreamDecoderState,
    chunk: StreamChunk,
) -> Result<Option<String>, ProviderError> {
    if let Some(error) = chunk.error {
        return Err(ProviderError::StreamInterrupted(error.message));
    }

    let mut text = String::new();
    for choice in chunk.choices {
        if let Some(content) = choice.delta.content.as_deref() {
            if let Some(fragment) = state.push_text(content) {
                text.push_str(&fragment);
            }
        }

        for tc in choice.delta.tool_calls.unwrap_or_default() {
            let (name, arguments) = match tc.function {
                Some(f) => (f.name, f.arguments),
                None => (None, None),
            };
            state.start_call(tc.index, tc.id.as_deref(), name.as_deref());
            if let Some(arguments) = arguments {
                state.append_args(tc.index, &arguments);
            }
        }

        if let Some(reason) = choice.finish_reason.as_deref() {
            state.finish(reason, TOOL_FINISH_REASONS);
        }
    }

    Ok((!text.is_empty()).then_some(text))
}

// --- OpenAI API types ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiToolCall {
    pub id: String,
    pub r#type: String,
    pub function: ApiFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiFunction {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Clone, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta, arriving incrementally across chunks.
#[derive(Debug, Clone, Deserialize)]
struct StreamToolCallDelta {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Clone, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct StreamError {
    #[serde(default)]
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::tool_calls;
    use convoy_core::message::MessageToolCall;
    use serde_json::json;

    fn feed(state: &mut StreamDecoderState, data: &str) -> Option<String> {
        match OpenAiAdapter.parse_event(data).unwrap() {
            WireEvent::OpenAi(chunk) => apply(state, chunk).unwrap(),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn fragmented_tool_call_accumulates() {
        let mut state = StreamDecoderState::new(ProviderKind::OpenAi);
        feed(
            &mut state,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"name":"f"}}]}}]}"#,
        );
        feed(
            &mut state,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"a\":"}}]}}]}"#,
        );
        feed(
            &mut state,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"1}"}}]}}]}"#,
        );
        feed(
            &mut state,
            r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
        );

        assert!(state.is_complete);
        let calls = tool_calls(&state);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "f");
        assert_eq!(calls[0].args, json!({"a": 1}));
    }

    #[test]
    fn every_tool_finish_reason_completes() {
        let cases = [
            ("tool_calls", true),
            ("tool_call", true),
            ("function_call", true),
            ("length", false),
        ];
        for (reason, complete) in cases {
            let mut state = StreamDecoderState::new(ProviderKind::OpenAi);
            feed(
                &mut state,
                r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c","function":{"name":"f","arguments":"{}"}}]}}]}"#,
            );
            let chunk = json!({"choices": [{"delta": {}, "finish_reason": reason}]});
            feed(&mut state, &chunk.to_string());
            assert_eq!(state.is_complete, complete, "finish_reason {reason}");
            assert_eq!(state.finish_reason.as_deref(), Some(reason));
        }
    }

    #[test]
    fn text_deltas_are_yielded_and_accumulated() {
        let mut state = StreamDecoderState::new(ProviderKind::OpenAi);
        assert_eq!(
            feed(&mut state, r#"{"choices":[{"delta":{"content":"Hel"}}]}"#).as_deref(),
            Some("Hel")
        );
        assert_eq!(
            feed(&mut state, r#"{"choices":[{"delta":{"content":"lo"}}]}"#).as_deref(),
            Some("lo")
        );
        assert!(feed(&mut state, r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#).is_none());
        assert_eq!(state.accumulated_text, "Hello");
        assert_eq!(state.finish_reason.as_deref(), Some("stop"));
        assert!(!state.is_complete);
    }

    #[test]
    fn parallel_calls_keep_their_indices() {
        let mut state = StreamDecoderState::new(ProviderKind::OpenAi);
        feed(
            &mut state,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_a","function":{"name":"search","arguments":"{}"}},{"index":1,"id":"call_b","function":{"name":"read_file","arguments":""}}]}}]}"#,
        );
        feed(
            &mut state,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":1,"id":"","function":{"arguments":"{\"path\":\"a.md\"}"}}]}}]}"#,
        );
        let calls = tool_calls(&state);
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[1].id, "call_b");
        assert_eq!(calls[1].args, json!({"path": "a.md"}));
    }

    #[test]
    fn stream_error_chunk_surfaces() {
        let mut state = StreamDecoderState::new(ProviderKind::OpenAi);
        let WireEvent::OpenAi(chunk) = OpenAiAdapter
            .parse_event(r#"{"error":{"message":"upstream reset"}}"#)
            .unwrap()
        else {
            panic!("expected openai event");
        };
        assert!(matches!(
            apply(&mut state, chunk),
            Err(ProviderError::StreamInterrupted(_))
        ));
    }

    #[test]
    fn format_keeps_roles_and_inlines_system() {
        let mut assistant = Message::assistant("");
        assistant.tool_calls = vec![MessageToolCall {
            id: "call_1".into(),
            name: "get_weather".into(),
            arguments: r#"{"city":"Paris"}"#.into(),
        }];
        let window = vec![
            Message::user("Weather?"),
            assistant,
            Message::tool_result("call_1", "18C"),
            Message::user("Thanks"),
        ];
        let conv = OpenAiAdapter.format(&window, Some("Be brief"), "Thanks").unwrap();
        assert!(conv.system.is_none());
        let roles: Vec<&str> = conv.messages.iter().map(|m| m.role()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "tool", "user"]);

        let json = serde_json::to_value(&conv.messages[3]).unwrap();
        assert_eq!(json["tool_call_id"], "call_1");
        let json = serde_json::to_value(&conv.messages[2]).unwrap();
        assert_eq!(json["tool_calls"][0]["function"]["name"], "get_weather");
    }

    #[test]
    fn body_shapes_tools_and_json_mode() {
        let config = ProviderConfig::new(ProviderKind::OpenAi, "gpt-4o", "sk-test");
        let conv = OpenAiAdapter.format(&[Message::user("hi")], None, "hi").unwrap();
        let tools = vec![ToolDefinition {
            name: "get_weather".into(),
            description: "Weather".into(),
            parameters: json!({"type": "object"}),
        }];

        let body = OpenAiAdapter.build_body(&config, &conv, &tools, false);
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "get_weather");
        assert!(body.get("response_format").is_none());

        let body = OpenAiAdapter.build_body(&config, &conv, &[], true);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert!(body.get("tools").is_none());

        let headers = OpenAiAdapter.headers(&config);
        assert!(headers.contains(&("Authorization".into(), "Bearer sk-test".into())));
    }

    #[test]
    fn result_and_invocation_shapes() {
        let mut call = ToolCall::new("call_1", "get_weather", json!({"city": "Paris"}), ProviderKind::OpenAi);
        call.start();

        let invocation = serde_json::to_value(OpenAiAdapter.encode_invocation("", &[call.clone()])).unwrap();
        assert_eq!(invocation["role"], "assistant");
        assert!(invocation["content"].is_null());
        assert_eq!(invocation["tool_calls"][0]["id"], "call_1");
        assert_eq!(invocation["tool_calls"][0]["function"]["arguments"], r#"{"city":"Paris"}"#);

        let result = serde_json::to_value(OpenAiAdapter.encode_result(&call, &json!({"tempC": 18}))).unwrap();
        assert_eq!(
            result,
            json!({"role": "tool", "content": "{\"tempC\":18}", "tool_call_id": "call_1"})
        );
    }
}
