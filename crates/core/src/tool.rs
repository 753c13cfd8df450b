//! Tool-call lifecycle and the execution seam.
//!
//! A [`ToolCall`] is materialized from a decoded model turn and then walks
//! `pending → running → success | error`. The agent loop runs it through a
//! host-supplied [`ToolExecutor`]; a [`ToolRegistry`] of local [`Tool`]s is
//! the stock executor.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use crate::error::ToolError;
use crate::provider::{ProviderKind, ToolDefinition};

/// Where a tool call is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Pending,
    Running,
    Success,
    Error,
}

impl ToolStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

/// A model-requested tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call ID assigned by the provider (matches the wire `id` / `tool_use_id`)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Parsed arguments; `{}` while the raw buffer is still incomplete
    pub args: serde_json::Value,

    /// Best-effort parse of an incomplete buffer, for progress display
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_args: Option<serde_json::Value>,

    /// The raw argument buffer when it could not be parsed yet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_args: Option<String>,

    pub status: ToolStatus,

    /// Dialect that produced the call
    pub provider: ProviderKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl ToolCall {
    /// Create a pending call.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        args: serde_json::Value,
        provider: ProviderKind,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
            partial_args: None,
            raw_args: None,
            status: ToolStatus::Pending,
            provider,
            result: None,
            error: None,
            start_time: None,
            end_time: None,
        }
    }

    /// `pending → running`. Returns `false` (and changes nothing) from any other state.
    pub fn start(&mut self) -> bool {
        if self.status != ToolStatus::Pending {
            return false;
        }
        self.status = ToolStatus::Running;
        self.start_time = Some(Utc::now());
        true
    }

    /// `running → success`.
    pub fn succeed(&mut self, result: serde_json::Value) -> bool {
        if self.status != ToolStatus::Running {
            return false;
        }
        self.status = ToolStatus::Success;
        self.result = Some(result);
        self.end_time = Some(self.finish_time());
        true
    }

    /// `running → error`.
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if self.status != ToolStatus::Running {
            return false;
        }
        self.status = ToolStatus::Error;
        self.error = Some(error.into());
        self.end_time = Some(self.finish_time());
        true
    }

    /// Wall-clock duration once the call reached a terminal state.
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }

    // Clocks can step backwards; end never precedes start.
    fn finish_time(&self) -> DateTime<Utc> {
        let now = Utc::now();
        match self.start_time {
            Some(start) if start > now => start,
            _ => now,
        }
    }
}

/// Observer fired on every status transition. Fire-and-forget: it must not
/// block and the loop never depends on it.
pub type ToolEventCallback = Arc<dyn Fn(&ToolCall) + Send + Sync>;

/// Runs a named tool with JSON arguments on behalf of the agent loop.
///
/// Hosts route this wherever they like: local file operations, a knowledge
/// base, or an external tool service.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Tools to declare to the model.
    fn definitions(&self) -> Vec<ToolDefinition> {
        Vec::new()
    }

    /// Execute one call.
    async fn execute(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> std::result::Result<serde_json::Value, ToolError>;
}

/// The result of a local tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            data: None,
        }
    }

    pub fn structured(data: serde_json::Value) -> Self {
        Self {
            success: true,
            output: String::new(),
            data: Some(data),
        }
    }

    /// The value handed back to the model: structured data when present,
    /// otherwise the text output.
    pub fn into_value(self) -> serde_json::Value {
        match self.data {
            Some(data) => data,
            None => serde_json::Value::String(self.output),
        }
    }
}

/// A single locally implemented capability.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "get_weather").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of local tools. Implements [`ToolExecutor`].
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    async fn execute(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> std::result::Result<serde_json::Value, ToolError> {
        let tool = self.tools.get(name).ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        let result = tool.execute(args).await?;
        if !result.success {
            return Err(ToolError::ExecutionFailed {
                tool_name: name.to_string(),
                reason: result.output,
            });
        }
        Ok(result.into_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str { "echo" }
        fn description(&self) -> &str { "Echoes back the input" }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError> {
            match arguments["text"].as_str() {
                Some(text) => Ok(ToolResult::text(text)),
                None => Ok(ToolResult {
                    success: false,
                    output: "missing text".into(),
                    data: None,
                }),
            }
        }
    }

    fn call() -> ToolCall {
        ToolCall::new("call_1", "echo", serde_json::json!({}), ProviderKind::OpenAi)
    }

    #[test]
    fn lifecycle_moves_forward_only() {
        let mut tc = call();
        assert_eq!(tc.status, ToolStatus::Pending);
        assert!(!tc.succeed(serde_json::json!(1)), "cannot succeed before running");
        assert!(tc.start());
        assert!(!tc.start(), "cannot start twice");
        assert!(tc.succeed(serde_json::json!({"ok": true})));
        assert!(!tc.fail("late"), "terminal states are final");
        assert_eq!(tc.status, ToolStatus::Success);
        assert!(tc.error.is_none());
        assert!(tc.end_time.unwrap() >= tc.start_time.unwrap());
        assert!(tc.duration_ms().unwrap() >= 0);
    }

    #[test]
    fn failure_records_error() {
        let mut tc = call();
        tc.start();
        assert!(tc.fail("boom"));
        assert_eq!(tc.status, ToolStatus::Error);
        assert_eq!(tc.error.as_deref(), Some("boom"));
        assert!(tc.status.is_terminal());
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.names(), vec!["echo"]);
    }

    #[test]
    fn registry_definitions() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let defs = registry.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "echo");
    }

    #[tokio::test]
    async fn registry_executes_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let value = registry
            .execute("echo", serde_json::json!({"text": "hello world"}))
            .await
            .unwrap();
        assert_eq!(value, serde_json::json!("hello world"));
    }

    #[tokio::test]
    async fn registry_unsuccessful_result_is_an_error() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let err = registry.execute("echo", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }

    #[tokio::test]
    async fn registry_execute_missing_tool() {
        let registry = ToolRegistry::new();
        let err = registry
            .execute("nonexistent", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }
}
