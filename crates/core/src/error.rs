//! Error types for the Convoy domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Provider failures are classified so the agent loop can decide between
//! retrying, shrinking the context, or surfacing the error.

use thiserror::Error;

/// The top-level error type for all Convoy operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Server error: {message} (status: {status_code})")]
    ServerError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Context window exceeded: {0}")]
    ContextWindowExceeded(String),

    #[error("Conversation violates the provider's turn order: {0}")]
    ProtocolViolation(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Whether a fresh attempt of the same request may succeed.
    ///
    /// Server errors, rate limits, dropped connections and network failures
    /// are transient. Credentials, context overflow and malformed
    /// conversations are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ServerError { .. }
                | Self::RateLimited { .. }
                | Self::StreamInterrupted(_)
                | Self::Network(_)
        )
    }

    /// Classify a non-success HTTP status and its body.
    pub fn from_status(status_code: u16, body: impl Into<String>) -> Self {
        let message = body.into();
        match status_code {
            401 | 403 => Self::AuthenticationFailed(message),
            429 => Self::RateLimited { retry_after_secs: 5 },
            400 | 413 if mentions_context_limit(&message) => Self::ContextWindowExceeded(message),
            500..=599 => Self::ServerError { status_code, message },
            _ => Self::ApiError { status_code, message },
        }
    }
}

/// Vendor phrasing for "your prompt is too long".
const CONTEXT_LIMIT_MARKERS: &[&str] = &[
    "context length",
    "context_length",
    "context window",
    "maximum context",
    "prompt is too long",
    "too many tokens",
    "exceeds the maximum number of tokens",
    "input token count",
];

fn mentions_context_limit(body: &str) -> bool {
    let lower = body.to_lowercase();
    CONTEXT_LIMIT_MARKERS.iter().any(|m| lower.contains(m))
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool source unavailable: {0}")]
    SourceUnavailable(String),
}
