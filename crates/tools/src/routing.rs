//! Tool executor that routes between local tools and an external catalog.

use crate::catalog::ToolCatalogCache;
use async_trait::async_trait;
use convoy_core::error::ToolError;
use convoy_core::provider::ToolDefinition;
use convoy_core::tool::{ToolExecutor, ToolRegistry};
use std::sync::Arc;
use tracing::debug;

/// Local registry first, then the external catalog.
///
/// The catalog is optional; without one the executor is just the registry.
pub struct RoutingExecutor {
    local: ToolRegistry,
    catalog: Option<Arc<ToolCatalogCache>>,
}

impl RoutingExecutor {
    pub fn new(local: ToolRegistry) -> Self {
        Self {
            local,
            catalog: None,
        }
    }

    pub fn with_catalog(mut self, catalog: Arc<ToolCatalogCache>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Load the external catalog so [`definitions`](ToolExecutor::definitions)
    /// can declare it. Errors leave the previous listing in place.
    pub async fn prime(&self) -> Result<(), ToolError> {
        if let Some(catalog) = &self.catalog {
            catalog.tools().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ToolExecutor for RoutingExecutor {
    fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs = self.local.definitions();
        if let Some(catalog) = &self.catalog {
            defs.extend(
                catalog
                    .cached()
                    .iter()
                    .filter(|t| !self.local.contains(&t.name))
                    .cloned(),
            );
        }
        defs
    }

    async fn execute(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        if self.local.contains(name) {
            return self.local.execute(name, args).await;
        }

        let Some(catalog) = &self.catalog else {
            return Err(ToolError::NotFound(name.to_string()));
        };

        if !catalog.contains(name).await? {
            return Err(ToolError::NotFound(name.to_string()));
        }

        debug!(tool = name, "Routing tool call to external source");
        catalog.source().execute(name, args).await
    }
}
