//! # Convoy Core
//!
//! Domain types, traits, and error definitions for the Convoy LLM
//! orchestration layer. This crate has **no I/O dependencies**: it defines
//! the vocabulary that the provider adapters, the tool layer, and the agent
//! loop all speak.
//!
//! ## Design Philosophy
//!
//! The seams of the system are traits defined here:
//! - [`ToolExecutor`] — how the loop runs a model-requested tool
//! - [`Tool`] — a single locally registered capability
//!
//! Provider dialects live in `convoy-providers`, the loop in `convoy-agent`.

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, ToolError};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{ContextLimits, ProviderConfig, ProviderKind, ToolDefinition};
pub use tool::{
    Tool, ToolCall, ToolEventCallback, ToolExecutor, ToolRegistry, ToolResult, ToolStatus,
};
