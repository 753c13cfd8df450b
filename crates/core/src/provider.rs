//! Provider configuration types.
//!
//! A [`ProviderConfig`] describes one call against one backend: which wire
//! dialect to speak, where, with which model and credentials, and how large
//! the model's context window is. It is immutable for the duration of a call.

use serde::{Deserialize, Serialize};

/// The wire dialect a backend speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// `POST {base}/chat/completions`, SSE, delta-indexed tool calls.
    #[serde(rename = "openai", alias = "openai_compat")]
    OpenAi,
    /// `POST {base}/v1/messages`, SSE, block-indexed tool calls.
    Anthropic,
    /// `streamGenerateContent`, SSE, whole function calls per part.
    Gemini,
    /// `POST {base}/api/chat`, NDJSON.
    Ollama,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [Self::OpenAi, Self::Anthropic, Self::Gemini, Self::Ollama];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::Ollama => "ollama",
        }
    }

    /// Whether the backend rejects conversations that do not strictly
    /// alternate user/assistant turns starting with a user turn.
    pub fn requires_alternation(&self) -> bool {
        matches!(self, Self::Anthropic | Self::Gemini)
    }

    /// Default API root for this dialect.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com",
            Self::Gemini => "https://generativelanguage.googleapis.com",
            Self::Ollama => "http://localhost:11434",
        }
    }

    /// Model used when no config entry or override names one.
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o-mini",
            Self::Anthropic => "claude-sonnet-4-20250514",
            Self::Gemini => "gemini-2.0-flash",
            Self::Ollama => "llama3.1",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "openai_compat" | "openai-compatible" | "openrouter" => Ok(Self::OpenAi),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "gemini" | "google" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            other => Err(format!("unknown provider kind '{other}'")),
        }
    }
}

/// Size of the model's window, in estimated tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextLimits {
    /// Total tokens the model accepts (prompt + completion).
    pub model_context_limit: u32,

    /// Tokens reserved for the model's reply.
    pub model_output_limit: u32,
}

impl ContextLimits {
    /// Tokens left for the prompt after reserving the reply and a safety buffer.
    pub fn prompt_budget(&self, reserved_buffer: u32) -> u32 {
        self.model_context_limit
            .saturating_sub(self.model_output_limit)
            .saturating_sub(reserved_buffer)
    }
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            model_context_limit: 128_000,
            model_output_limit: 4_096,
        }
    }
}

/// Everything needed to address one model on one backend.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider: ProviderKind,
    pub model: String,
    #[serde(default)]
    pub api_key: String,
    pub base_url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub context_limits: ContextLimits,
}

fn default_temperature() -> f32 {
    0.7
}

impl ProviderConfig {
    /// Create a config pointing at the dialect's default endpoint.
    pub fn new(provider: ProviderKind, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            api_key: api_key.into(),
            base_url: provider.default_base_url().into(),
            temperature: default_temperature(),
            context_limits: ContextLimits::default(),
        }
    }

    /// Override the base URL (trailing slashes are dropped).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_context_limits(mut self, limits: ContextLimits) -> Self {
        self.context_limits = limits;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &if self.api_key.is_empty() { "None" } else { "[REDACTED]" })
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("context_limits", &self.context_limits)
            .finish()
    }
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}
