//! Tool execution for Convoy.
//!
//! The agent loop only knows [`ToolExecutor`](convoy_core::ToolExecutor).
//! This crate supplies the executors hosts usually want: workspace file
//! tools, an injected catalog cache over an external tool source, and a
//! [`RoutingExecutor`] that tries local tools before the external source.

pub mod catalog;
pub mod files;
pub mod routing;

use convoy_core::tool::ToolRegistry;
use std::path::PathBuf;

pub use catalog::{ExternalToolSource, ToolCatalogCache};
pub use files::{ListFilesTool, ReadFileTool, WriteFileTool};
pub use routing::RoutingExecutor;

/// Registry with the workspace file tools rooted at `root`.
pub fn workspace_registry(root: impl Into<PathBuf>) -> ToolRegistry {
    let root = root.into();
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(ReadFileTool::new(root.clone())));
    registry.register(Box::new(WriteFileTool::new(root.clone())));
    registry.register(Box::new(ListFilesTool::new(root)));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_registry_has_file_tools() {
        let registry = workspace_registry("/tmp/convoy-workspace");
        assert_eq!(registry.names(), vec!["list_files", "read_file", "write_file"]);
    }
}
