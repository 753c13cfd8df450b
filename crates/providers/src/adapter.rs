//! The per-dialect seam.
//!
//! Every backend is driven by the same agent loop; what differs is how the
//! conversation is shaped, how the stream is decoded, and how tool traffic
//! is encoded. A [`ProviderAdapter`] bundles those three concerns for one
//! wire dialect.

use crate::decoder::WireEvent;
use crate::framing::Framing;
use crate::{anthropic, gemini, ollama, openai_compat};
use convoy_core::error::ProviderError;
use convoy_core::message::Message;
use convoy_core::provider::{ProviderConfig, ProviderKind, ToolDefinition};
use convoy_core::tool::ToolCall;
use serde::Serialize;
use std::sync::Arc;

/// One message in a provider's native shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WireMessage {
    OpenAi(openai_compat::ChatMessage),
    Anthropic(anthropic::AnthropicMessage),
    Gemini(gemini::Content),
    Ollama(ollama::ChatMessage),
}

impl WireMessage {
    /// The role string as the provider sees it.
    pub fn role(&self) -> &str {
        match self {
            Self::OpenAi(m) => &m.role,
            Self::Anthropic(m) => &m.role,
            Self::Gemini(c) => &c.role,
            Self::Ollama(m) => &m.role,
        }
    }
}

/// A formatted conversation, ready to be extended round by round.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WireConversation {
    /// System text for providers that take it out of band.
    pub system: Option<String>,
    pub messages: Vec<WireMessage>,
}

/// A fully addressed streaming request.
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: serde_json::Value,
    pub framing: Framing,
}

/// Formatter, decoder and encoder for one wire dialect.
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn framing(&self) -> Framing {
        Framing::Sse
    }

    fn endpoint(&self, config: &ProviderConfig) -> String;

    fn headers(&self, config: &ProviderConfig) -> Vec<(String, String)>;

    /// Render a truncated window (ending with the pending prompt) into the
    /// provider's message array.
    fn format(
        &self,
        window: &[Message],
        system: Option<&str>,
        pending_prompt: &str,
    ) -> Result<WireConversation, ProviderError>;

    fn build_body(
        &self,
        config: &ProviderConfig,
        conversation: &WireConversation,
        tools: &[ToolDefinition],
        json_mode: bool,
    ) -> serde_json::Value;

    /// Decode one frame. Malformed frames surface as a serde error.
    fn parse_event(&self, data: &str) -> Result<WireEvent, serde_json::Error>;

    /// The assistant message that requested `calls`.
    fn encode_invocation(&self, text: &str, calls: &[ToolCall]) -> WireMessage;

    /// The message carrying one call's result.
    fn encode_result(&self, call: &ToolCall, result: &serde_json::Value) -> WireMessage;

    /// Messages carrying all results of one round, in call order.
    fn encode_results(&self, results: &[(ToolCall, serde_json::Value)]) -> Vec<WireMessage> {
        results
            .iter()
            .map(|(call, result)| self.encode_result(call, result))
            .collect()
    }

    fn request(
        &self,
        config: &ProviderConfig,
        conversation: &WireConversation,
        tools: &[ToolDefinition],
        json_mode: bool,
    ) -> WireRequest {
        WireRequest {
            url: self.endpoint(config),
            headers: self.headers(config),
            body: self.build_body(config, conversation, tools, json_mode),
            framing: self.framing(),
        }
    }
}

/// The adapter for a dialect.
pub fn adapter_for(kind: ProviderKind) -> Arc<dyn ProviderAdapter> {
    match kind {
        ProviderKind::OpenAi => Arc::new(openai_compat::OpenAiAdapter),
        ProviderKind::Anthropic => Arc::new(anthropic::AnthropicAdapter),
        ProviderKind::Gemini => Arc::new(gemini::GeminiAdapter),
        ProviderKind::Ollama => Arc::new(ollama::OllamaAdapter),
    }
}
