//! Ollama `/api/chat` dialect (NDJSON streaming).

use crate::accumulator::StreamDecoderState;
use crate::adapter::{ProviderAdapter, WireConversation, WireMessage};
use crate::decoder::WireEvent;
use crate::encoder::stringify;
use crate::framing::Framing;
use convoy_core::error::ProviderError;
use convoy_core::message::{Message, Role};
use convoy_core::provider::{ProviderConfig, ProviderKind, ToolDefinition};
use convoy_core::tool::ToolCall;
use serde::{Deserialize, Serialize};

/// Tolerant dialect: history passes through with its roles.
pub struct OllamaAdapter;

impl OllamaAdapter {
    fn to_api_message(msg: &Message) -> ChatMessage {
        ChatMessage {
            role: msg.role.as_str().into(),
            content: msg.content.clone(),
            tool_calls: if msg.tool_calls.is_empty() {
                None
            } else {
                Some(
                    msg.tool_calls
                        .iter()
                        .map(|tc| OllamaToolCall {
                            function: OllamaFunction {
                                name: tc.name.clone(),
                                arguments: serde_json::from_str(&tc.arguments)
                                    .unwrap_or_else(|_| serde_json::json!({})),
                            },
                        })
                        .collect(),
                )
            },
        }
    }
}

impl ProviderAdapter for OllamaAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn framing(&self) -> Framing {
        Framing::Ndjson
    }

    fn endpoint(&self, config: &ProviderConfig) -> String {
        format!("{}/api/chat", config.base_url)
    }

    fn headers(&self, config: &ProviderConfig) -> Vec<(String, String)> {
        let mut headers = vec![("Content-Type".into(), "application/json".into())];
        // Plain Ollama ignores auth; hosted proxies in front of it do not.
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
            messages.push(WireMessage::Ollama(Self::to_api_message(&Message::system(system))));
        }
        messages.extend(
            window
                .iter()
                .map(|m| WireMessage::Ollama(Self::to_api_message(m))),
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
            "stream": true,
            "options": {
                "temperature": config.temperature,
                "num_ctx": config.context_limits.model_context_limit,
            },
        });

        if !tools.is_empty() {
            let tools: Vec<serde_json::Value> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = serde_json::json!(tools);
        }

        if json_mode {
            body["format"] = serde_json::json!("json");
        }

        body
    }

    fn parse_event(&self, data: &str) -> Result<WireEvent, serde_json::Error> {
        serde_json::from_str::<StreamChunk>(data).map(WireEvent::Ollama)
    }

    fn encode_invocation(&self, text: &str, calls: &[ToolCall]) -> WireMessage {
        WireMessage::Ollama(ChatMessage {
            role: Role::Assistant.as_str().into(),
            content: text.to_string(),
            tool_calls: Some(
                calls
                    .iter()
                    .map(|call| OllamaToolCall {
                        function: OllamaFunction {
                            name: call.name.clone(),
                            arguments: call.args.clone(),
                        },
                    })
                    .collect(),
            ),
        })
    }

    fn encode_result(&self, _call: &ToolCall, result: &serde_json::Value) -> WireMessage {
        WireMessage::Ollama(ChatMessage {
            role: Role::Tool.as_str().into(),
            content: stringify(result),
            tool_calls: None,
        })
    }
}

/// Fold one NDJSON line into the round state.
pub(crate) fn apply(
    state: &mut StreamDecoderState,
    chunk: StreamChunk,
) -> Result<Option<String>, ProviderError> {
    if let Some(error) = chunk.error {
        return Err(ProviderError::StreamInterrupted(error));
    }

    let mut text = None;
    if let Some(message) = chunk.message {
        text = state.push_text(&message.content);
        for call in message.tool_calls.unwrap_or_default() {
            state.push_whole_call(None, &call.function.name, &call.function.arguments);
        }
    }

    if chunk.done {
        let reason = chunk.done_reason.as_deref().unwrap_or("stop");
        state.finish(reason, &[]);
        if state.has_calls() {
            state.is_complete = true;
        }
    }

    Ok(text)
}

// --- Ollama API types ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OllamaToolCall>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OllamaToolCall {
    pub function: OllamaFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OllamaFunction {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// One NDJSON line of a streaming chat response.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    message: Option<ChatMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::tool_calls;
    use serde_json::json;

    fn feed(state: &mut StreamDecoderState, data: &str) -> Result<Option<String>, ProviderError> {
        match OllamaAdapter.parse_event(data).unwrap() {
            WireEvent::Ollama(chunk) => apply(state, chunk),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn done_line_completes_tool_turn() {
        let mut state = StreamDecoderState::new(ProviderKind::Ollama);
        feed(
            &mut state,
            r#"{"model":"llama3.1","message":{"role":"assistant","content":"","tool_calls":[{"function":{"name":"get_weather","arguments":{"city":"Paris"}}}]},"done":false}"#,
        )
        .unwrap();
        assert!(!state.is_complete);
        feed(
            &mut state,
            r#"{"model":"llama3.1","message":{"role":"assistant","content":""},"done":true,"done_reason":"stop"}"#,
        )
        .unwrap();

        assert!(state.is_complete);
        let calls = tool_calls(&state);
        assert_eq!(calls[0].name, "get_weather");
        assert_eq!(calls[0].args, json!({"city": "Paris"}));
        assert_eq!(calls[0].id, "call_0");
    }

    #[test]
    fn text_stream_finishes_without_calls() {
        let mut state = StreamDecoderState::new(ProviderKind::Ollama);
        let out = feed(&mut state, r#"{"message":{"role":"assistant","content":"Bon"},"done":false}"#).unwrap();
        assert_eq!(out.as_deref(), Some("Bon"));
        feed(&mut state, r#"{"message":{"role":"assistant","content":"jour"},"done":true}"#).unwrap();
        assert_eq!(state.accumulated_text, "Bonjour");
        assert!(!state.is_complete);
    }

    #[test]
    fn error_line_surfaces() {
        let mut state = StreamDecoderState::new(ProviderKind::Ollama);
        assert!(feed(&mut state, r#"{"error":"model not found"}"#).is_err());
    }

    #[test]
    fn body_and_result_shapes() {
        let config = ProviderConfig::new(ProviderKind::Ollama, "llama3.1", "");
        let conv = OllamaAdapter.format(&[Message::user("hi")], Some("sys"), "hi").unwrap();
        let body = OllamaAdapter.build_body(&config, &conv, &[], true);
        assert_eq!(body["format"], "json");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(OllamaAdapter.endpoint(&config), "http://localhost:11434/api/chat");
        assert_eq!(OllamaAdapter.headers(&config).len(), 1);

        let call = ToolCall::new("call_0", "get_weather", json!({}), ProviderKind::Ollama);
        let result = serde_json::to_value(OllamaAdapter.encode_result(&call, &json!({"tempC": 18}))).unwrap();
        assert_eq!(result, json!({"role": "tool", "content": "{\"tempC\":18}"}));
    }
}
