//! Gemini `streamGenerateContent` dialect.
//!
//! Gemini streams whole function calls inside content parts rather than
//! argument fragments, names the assistant role `model`, and takes the
//! system prompt as `systemInstruction`.

use crate::accumulator::StreamDecoderState;
use crate::adapter::{ProviderAdapter, WireConversation, WireMessage};
use crate::decoder::WireEvent;
use crate::format::{alternating_turns, split_system};
use convoy_core::error::ProviderError;
use convoy_core::message::{Message, Role};
use convoy_core::provider::{ProviderConfig, ProviderKind, ToolDefinition};
use convoy_core::tool::ToolCall;
use serde::{Deserialize, Serialize};

const MODEL_ROLE: &str = "model";

pub struct GeminiAdapter;

impl GeminiAdapter {
    fn role(role: Role) -> &'static str {
        match role {
            Role::Assistant => MODEL_ROLE,
            _ => "user",
        }
    }
}

/// `functionResponse.response` must be an object.
fn response_object(result: &serde_json::Value) -> serde_json::Value {
    match result {
        serde_json::Value::Object(_) => result.clone(),
        other => serde_json::json!({ "content": other }),
    }
}

fn response_part(call: &ToolCall, result: &serde_json::Value) -> Part {
    Part {
        function_response: Some(FunctionResponse {
            name: call.name.clone(),
            response: response_object(result),
        }),
        ..Part::default()
    }
}

impl ProviderAdapter for GeminiAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn endpoint(&self, config: &ProviderConfig) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            config.base_url, config.model
        )
    }

    fn headers(&self, config: &ProviderConfig) -> Vec<(String, String)> {
        vec![
            ("x-goog-api-key".into(), config.api_key.clone()),
            ("Content-Type".into(), "application/json".into()),
        ]
    }

    fn format(
        &self,
        window: &[Message],
        system: Option<&str>,
        pending_prompt: &str,
    ) -> Result<WireConversation, ProviderError> {
        let (system, rest) = split_system(window, system);
        let messages = alternating_turns(&rest, pending_prompt)?
            .into_iter()
            .map(|turn| {
                WireMessage::Gemini(Content {
                    role: Self::role(turn.role).into(),
                    parts: vec![Part::text(turn.content)],
                })
            })
            .collect();
        Ok(WireConversation { system, messages })
    }

    fn build_body(
        &self,
        config: &ProviderConfig,
        conversation: &WireConversation,
        tools: &[ToolDefinition],
        json_mode: bool,
    ) -> serde_json::Value {
        let mut generation = serde_json::json!({
            "temperature": config.temperature,
            "maxOutputTokens": config.context_limits.model_output_limit,
        });
        if json_mode {
            generation["responseMimeType"] = serde_json::json!("application/json");
        }

        let mut body = serde_json::json!({
            "contents": conversation.messages,
            "generationConfig": generation,
        });

        if let Some(ref sys) = conversation.system {
            body["systemInstruction"] = serde_json::json!({ "parts": [{ "text": sys }] });
        }

        if !tools.is_empty() {
            let declarations: Vec<serde_json::Value> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    })
                })
                .collect();
            body["tools"] = serde_json::json!([{ "functionDeclarations": declarations }]);
        }

        body
    }

    fn parse_event(&self, data: &str) -> Result<WireEvent, serde_json::Error> {
        serde_json::from_str::<StreamChunk>(data).map(WireEvent::Gemini)
    }

    fn encode_invocation(&self, text: &str, calls: &[ToolCall]) -> WireMessage {
        let mut parts = Vec::with_capacity(calls.len() + 1);
        if !text.is_empty() {
            parts.push(Part::text(text));
        }
        parts.extend(calls.iter().map(|call| Part {
            function_call: Some(FunctionCall {
                name: call.name.clone(),
                args: call.args.clone(),
            }),
            ..Part::default()
        }));
        WireMessage::Gemini(Content {
            role: MODEL_ROLE.into(),
            parts,
        })
    }

    fn encode_result(&self, call: &ToolCall, result: &serde_json::Value) -> WireMessage {
        WireMessage::Gemini(Content {
            role: "user".into(),
            parts: vec![response_part(call, result)],
        })
    }

    /// One user turn with a `functionResponse` part per call.
    fn encode_results(&self, results: &[(ToolCall, serde_json::Value)]) -> Vec<WireMessage> {
        if results.is_empty() {
            return Vec::new();
        }
        vec![WireMessage::Gemini(Content {
            role: "user".into(),
            parts: results
                .iter()
                .map(|(call, result)| response_part(call, result))
                .collect(),
        })]
    }
}

/// Fold one streamed chunk into the round state.
pub(crate) fn apply(
    state: &mut StreamDecoderState,
    chunk: StreamChunk,
) -> Result<Option<String>, ProviderError> {
    if let Some(error) = chunk.error {
        return Err(ProviderError::from_status(error.code, error.message));
    }

    let mut text = String::new();
    for candidate in chunk.candidates {
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(fragment) = part.text.as_deref().and_then(|t| state.push_text(t)) {
                text.push_str(&fragment);
            }
            if let Some(call) = part.function_call {
                state.push_whole_call(None, &call.name, &call.args);
            }
        }

        // Gemini reports STOP even when the turn ends in function calls.
        if let Some(reason) = candidate.finish_reason.as_deref() {
            state.finish(reason, &[]);
            if state.has_calls() {
                state.is_complete = true;
            }
        }
    }

    Ok((!text.is_empty()).then_some(text))
}

// --- Gemini API types ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub name: String,
    pub response: serde_json::Value,
}

// --- Streaming SSE types ---

#[derive(Debug, Clone, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct StreamError {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::tool_calls;
    use serde_json::json;

    fn feed(state: &mut StreamDecoderState, data: &str) -> Result<Option<String>, ProviderError> {
        match GeminiAdapter.parse_event(data).unwrap() {
            WireEvent::Gemini(chunk) => apply(state, chunk),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn function_calls_complete_on_finish() {
        let mut state = StreamDecoderState::new(ProviderKind::Gemini);
        let out = feed(
            &mut state,
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Let me check. "}]}}]}"#,
        )
        .unwrap();
        assert_eq!(out.as_deref(), Some("Let me check. "));
        feed(
            &mut state,
            r#"{"candidates":[{"content":{"role":"model","parts":[{"functionCall":{"name":"get_weather","args":{"city":"Paris"}}}]},"finishReason":"STOP"}]}"#,
        )
        .unwrap();

        assert!(state.is_complete);
        let calls = tool_calls(&state);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "get_weather");
        assert_eq!(calls[0].args, json!({"city": "Paris"}));
    }

    #[test]
    fn plain_stop_is_not_a_tool_turn() {
        let mut state = StreamDecoderState::new(ProviderKind::Gemini);
        feed(
            &mut state,
            r#"{"candidates":[{"content":{"parts":[{"text":"Done."}]},"finishReason":"STOP"}],"usageMetadata":{"totalTokenCount":9}}"#,
        )
        .unwrap();
        assert!(!state.is_complete);
        assert_eq!(state.finish_reason.as_deref(), Some("STOP"));
    }

    #[test]
    fn error_chunk_is_classified() {
        let mut state = StreamDecoderState::new(ProviderKind::Gemini);
        let err = feed(
            &mut state,
            r#"{"error":{"code":429,"message":"Resource exhausted","status":"RESOURCE_EXHAUSTED"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited { .. }));
    }

    #[test]
    fn body_uses_contents_and_system_instruction() {
        let config = ProviderConfig::new(ProviderKind::Gemini, "gemini-2.0-flash", "key");
        let window = vec![Message::user("a"), Message::assistant("b"), Message::user("c")];
        let conv = GeminiAdapter.format(&window, Some("sys"), "c").unwrap();
        let tools = vec![ToolDefinition {
            name: "get_weather".into(),
            description: "Weather".into(),
            parameters: json!({"type": "object"}),
        }];
        let body = GeminiAdapter.build_body(&config, &conv, &tools, true);

        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "a");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "sys");
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["tools"][0]["functionDeclarations"][0]["name"], "get_weather");
        assert_eq!(
            GeminiAdapter.endpoint(&config),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:streamGenerateContent?alt=sse"
        );
    }

    #[test]
    fn non_object_results_are_wrapped() {
        let mut call = ToolCall::new("call_0", "count", json!({}), ProviderKind::Gemini);
        call.start();
        let other = ToolCall::new("call_1", "get_weather", json!({}), ProviderKind::Gemini);
        let msgs = GeminiAdapter.encode_results(&[(call, json!(3)), (other, json!({"tempC": 18}))]);
        assert_eq!(msgs.len(), 1);
        let json = serde_json::to_value(&msgs[0]).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(
            json["parts"][0]["functionResponse"],
            json!({"name": "count", "response": {"content": 3}})
        );
        assert_eq!(json["parts"][1]["functionResponse"]["response"], json!({"tempC": 18}));
    }
}
