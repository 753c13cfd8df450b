//! Anthropic Messages API dialect.
//!
//! Features:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level field
//! - Strict user/assistant alternation
//! - Native tool use with `tool_use` / `tool_result` content blocks
//! - Streaming via SSE with block-indexed events

use crate::accumulator::StreamDecoderState;
use crate::adapter::{ProviderAdapter, WireConversation, WireMessage};
use crate::decoder::WireEvent;
use crate::encoder::stringify;
use crate::format::{alternating_turns, split_system};
use convoy_core::error::ProviderError;
use convoy_core::message::{Message, Role};
use convoy_core::provider::{ProviderConfig, ProviderKind, ToolDefinition};
use convoy_core::tool::ToolCall;
use serde::{Deserialize, Serialize};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Stop reasons that mean "run the tools".
const TOOL_STOP_REASONS: &[&str] = &["tool_use", "tool_calls", "tool_call"];

pub struct AnthropicAdapter;

impl AnthropicAdapter {
    /// Convert tool definitions to Anthropic format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<AnthropicTool> {
        tools
            .iter()
            .map(|t| AnthropicTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.parameters.clone(),
            })
            .collect()
    }
}

impl ProviderAdapter for AnthropicAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn endpoint(&self, config: &ProviderConfig) -> String {
        format!("{}/v1/messages", config.base_url)
    }

    fn headers(&self, config: &ProviderConfig) -> Vec<(String, String)> {
        vec![
            ("x-api-key".into(), config.api_key.clone()),
            ("anthropic-version".into(), ANTHROPIC_VERSION.into()),
            ("Content-Type".into(), "application/json".into()),
            ("Accept".into(), "text/event-stream".into()),
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
                WireMessage::Anthropic(AnthropicMessage {
                    role: turn.role.as_str().into(),
                    content: AnthropicContent::Text(turn.content),
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
        _json_mode: bool,
    ) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": config.model,
            "messages": conversation.messages,
            "max_tokens": config.context_limits.model_output_limit,
            "temperature": config.temperature,
            "stream": true,
        });

        if let Some(ref sys) = conversation.system {
            body["system"] = serde_json::json!(sys);
        }

        if !tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(tools));
        }

        body
    }

    fn parse_event(&self, data: &str) -> Result<WireEvent, serde_json::Error> {
        serde_json::from_str::<StreamEvent>(data).map(WireEvent::Anthropic)
    }

    fn encode_invocation(&self, text: &str, calls: &[ToolCall]) -> WireMessage {
        let mut blocks: Vec<ContentBlock> = Vec::with_capacity(calls.len() + 1);
        if !text.is_empty() {
            blocks.push(ContentBlock::Text {
                text: text.to_string(),
            });
        }
        for call in calls {
            blocks.push(ContentBlock::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: call.args.clone(),
            });
        }
        WireMessage::Anthropic(AnthropicMessage {
            role: Role::Assistant.as_str().into(),
            content: AnthropicContent::Blocks(blocks),
        })
    }

    fn encode_result(&self, call: &ToolCall, result: &serde_json::Value) -> WireMessage {
        WireMessage::Anthropic(AnthropicMessage {
            role: Role::User.as_str().into(),
            content: AnthropicContent::Blocks(vec![ContentBlock::ToolResult {
                tool_use_id: call.id.clone(),
                content: stringify(result),
            }]),
        })
    }

    /// All results of a round travel in one user turn.
    fn encode_results(&self, results: &[(ToolCall, serde_json::Value)]) -> Vec<WireMessage> {
        let blocks: Vec<ContentBlock> = results
            .iter()
            .map(|(call, result)| ContentBlock::ToolResult {
                tool_use_id: call.id.clone(),
                content: stringify(result),
            })
            .collect();
        if blocks.is_empty() {
            return Vec::new();
        }
        vec![WireMessage::Anthropic(AnthropicMessage {
            role: Role::User.as_str().into(),
            content: AnthropicContent::Blocks(blocks),
        })]
    }
}

/// Fold one streamed event into the round state.
pub(crate) fn apply(
    state: &mut StreamDecoderState,
    event: StreamEvent,
) -> Result<Option<String>, ProviderError> {
    match event {
        StreamEvent::ContentBlockStart {
            index,
            content_block,
        } => match content_block {
            StartBlock::Text { text } => Ok(state.push_text(&text)),
            StartBlock::ToolUse { id, name, input } => {
                state.start_call(index, Some(&id), Some(&name));
                match input {
                    serde_json::Value::String(s) if !s.is_empty() => state.append_args(index, &s),
                    serde_json::Value::Object(map) if !map.is_empty() => {
                        state.append_args(index, &serde_json::Value::Object(map).to_string())
                    }
                    _ => {}
                }
                Ok(None)
            }
            StartBlock::Other => Ok(None),
        },
        StreamEvent::ContentBlockDelta { index, delta } => match delta {
            BlockDelta::TextDelta { text } => Ok(state.push_text(&text)),
            BlockDelta::InputJsonDelta { partial_json } => {
                state.append_args(index, &partial_json);
                Ok(None)
            }
            BlockDelta::Other => Ok(None),
        },
        StreamEvent::MessageDelta { delta } => {
            if let Some(reason) = delta.stop_reason.as_deref() {
                state.finish(reason, TOOL_STOP_REASONS);
            }
            Ok(None)
        }
        StreamEvent::MessageStop { stop_reason } => {
            if let Some(reason) = stop_reason.as_deref() {
                state.finish(reason, TOOL_STOP_REASONS);
            }
            // Some proxies never send a stop reason. A recorded non-tool
            // reason such as `max_tokens` leaves the calls incomplete.
            if state.finish_reason.is_none() && state.has_calls() {
                state.is_complete = true;
            }
            Ok(None)
        }
        StreamEvent::Error { error } => {
            let status = match error.kind.as_str() {
                "authentication_error" => 401,
                "permission_error" => 403,
                "rate_limit_error" => 429,
                "invalid_request_error" => 400,
                "overloaded_error" => 529,
                _ => 500,
            };
            Err(ProviderError::from_status(status, error.message))
        }
        StreamEvent::MessageStart {}
        | StreamEvent::ContentBlockStop {}
        | StreamEvent::Ping {}
        | StreamEvent::Unknown => Ok(None),
    }
}

// --- Anthropic API types ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnthropicMessage {
    pub role: String,
    pub content: AnthropicContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnthropicContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

// --- Streaming SSE types ---

/// One `data:` payload of the Messages stream.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart {},
    ContentBlockStart {
        index: u32,
        content_block: StartBlock,
    },
    ContentBlockDelta {
        index: u32,
        delta: BlockDelta,
    },
    ContentBlockStop {},
    MessageDelta {
        delta: MessageDeltaBody,
    },
    MessageStop {
        #[serde(default)]
        stop_reason: Option<String>,
    },
    Ping {},
    Error {
        error: StreamError,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StartBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageDeltaBody {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamError {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    message: String,
}
