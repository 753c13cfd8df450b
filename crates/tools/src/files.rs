//! Workspace file tools: `read_file`, `write_file`, `list_files`.
//!
//! All paths are relative to a workspace root. Absolute paths and `..`
//! components are rejected before touching the filesystem.

use async_trait::async_trait;
use convoy_core::error::ToolError;
use convoy_core::tool::{Tool, ToolResult};
use std::path::{Component, Path, PathBuf};

/// Resolve `relative` inside `root`, refusing anything that could escape it.
fn resolve(root: &Path, relative: &str) -> Result<PathBuf, ToolError> {
    let rel = Path::new(relative);
    if rel.is_absolute() {
        return Err(ToolError::InvalidArguments(format!(
            "path must be relative to the workspace: {relative}"
        )));
    }
    if rel
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_) | Component::RootDir))
    {
        return Err(ToolError::InvalidArguments(format!(
            "path escapes the workspace: {relative}"
        )));
    }
    Ok(root.join(rel))
}

fn path_arg(arguments: &serde_json::Value) -> Result<&str, ToolError> {
    arguments["path"]
        .as_str()
        .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))
}

fn failed(output: String) -> ToolResult {
    ToolResult {
        success: false,
        output,
        data: None,
    }
}

pub struct ReadFileTool {
    root: PathBuf,
}

impl ReadFileTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file in the workspace."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to the workspace root"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let relative = path_arg(&arguments)?;
        let path = resolve(&self.root, relative)?;

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(ToolResult::structured(serde_json::json!({
                "path": relative,
                "content": content,
            }))),
            Err(e) => Ok(failed(format!("Failed to read file: {e}"))),
        }
    }
}

pub struct WriteFileTool {
    root: PathBuf,
}

impl WriteFileTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Create or overwrite a file in the workspace."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File path relative to the workspace root" },
                "content": { "type": "string", "description": "Full file contents" }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let relative = path_arg(&arguments)?;
        let content = arguments["content"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'content' argument".into()))?;
        let path = resolve(&self.root, relative)?;

        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return Ok(failed(format!("Failed to create directory: {e}")));
            }
        }

        match tokio::fs::write(&path, content).await {
            Ok(()) => Ok(ToolResult::structured(serde_json::json!({
                "path": relative,
                "bytes_written": content.len(),
            }))),
            Err(e) => Ok(failed(format!("Failed to write file: {e}"))),
        }
    }
}

pub struct ListFilesTool {
    root: PathBuf,
}

impl ListFilesTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List the entries of a workspace directory."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory relative to the workspace root (default: root)"
                }
            }
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let relative = arguments["path"].as_str().unwrap_or("");
        let dir = resolve(&self.root, relative)?;

        let mut reader = match tokio::fs::read_dir(&dir).await {
            Ok(reader) => reader,
            Err(e) => return Ok(failed(format!("Failed to list directory: {e}"))),
        };

        let mut entries = Vec::new();
        loop {
            match reader.next_entry().await {
                Ok(Some(entry)) => {
                    let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
                    entries.push(serde_json::json!({
                        "name": entry.file_name().to_string_lossy(),
                        "dir": is_dir,
                    }));
                }
                Ok(None) => break,
                Err(e) => return Ok(failed(format!("Failed to list directory: {e}"))),
            }
        }
        entries.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));

        Ok(ToolResult::structured(serde_json::json!({ "entries": entries })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_core::tool::{ToolExecutor, ToolRegistry};

    fn registry(root: &Path) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(ReadFileTool::new(root)));
        registry.register(Box::new(WriteFileTool::new(root)));
        registry.register(Box::new(ListFilesTool::new(root)));
        registry
    }

    #[tokio::test]
    async fn write_then_read_then_list() {
        let dir = tempfile::tempdir().unwrap();
        let tools = registry(dir.path());

        tools
            .execute(
                "write_file",
                serde_json::json!({"path": "notes/today.md", "content": "# Today"}),
            )
            .await
            .unwrap();

        let read = tools
            .execute("read_file", serde_json::json!({"path": "notes/today.md"}))
            .await
            .unwrap();
        assert_eq!(read["content"], "# Today");

        let listing = tools
            .execute("list_files", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(listing["entries"][0]["name"], "notes");
        assert_eq!(listing["entries"][0]["dir"], true);
    }

    #[tokio::test]
    async fn escaping_paths_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ReadFileTool::new(dir.path());
        let err = tool
            .execute(serde_json::json!({"path": "../../etc/passwd"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
        assert!(tool.execute(serde_json::json!({"path": "/etc/passwd"})).await.is_err());
    }

    #[tokio::test]
    async fn missing_file_is_an_unsuccessful_result() {
        let dir = tempfile::tempdir().unwrap();
        let result = ReadFileTool::new(dir.path())
            .execute(serde_json::json!({"path": "nope.txt"}))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.output.contains("Failed to read file"));
    }
}
