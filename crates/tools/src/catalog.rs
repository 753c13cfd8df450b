//! External tool sources and their catalog cache.
//!
//! An external tool service (an MCP-style server, a plugin host) is reached
//! through [`ExternalToolSource`]. Listing its tools can be slow, so
//! [`ToolCatalogCache`] keeps the last listing for a TTL. The cache is an
//! ordinary value owned by whoever builds the executor: sessions that share
//! one share its listing, tests get a fresh one each time.

use async_trait::async_trait;
use convoy_core::error::ToolError;
use convoy_core::provider::ToolDefinition;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// A remote provider of tools.
#[async_trait]
pub trait ExternalToolSource: Send + Sync {
    /// Current tool catalog.
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ToolError>;

    /// Execute a tool by name.
    async fn execute(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError>;
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    tools: Arc<Vec<ToolDefinition>>,
    fetched_at: Instant,
}

/// TTL-bounded, single-flight cache over one [`ExternalToolSource`].
///
/// Concurrent callers that find the cache stale wait on one refresh instead
/// of each listing the source.
pub struct ToolCatalogCache {
    source: Arc<dyn ExternalToolSource>,
    ttl: Duration,
    entry: Mutex<Option<CatalogEntry>>,
    // Last good listing, readable without awaiting.
    snapshot: RwLock<Arc<Vec<ToolDefinition>>>,
}

impl ToolCatalogCache {
    pub fn new(source: Arc<dyn ExternalToolSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            entry: Mutex::new(None),
            snapshot: RwLock::new(Arc::new(Vec::new())),
        }
    }

    pub fn source(&self) -> &Arc<dyn ExternalToolSource> {
        &self.source
    }

    /// The catalog, refreshed from the source when missing or older than the TTL.
    pub async fn tools(&self) -> Result<Arc<Vec<ToolDefinition>>, ToolError> {
        let mut entry = self.entry.lock().await;
        if let Some(cached) = entry.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok(cached.tools.clone());
            }
        }

        debug!("Refreshing external tool catalog");
        let tools = match self.source.list_tools().await {
            Ok(tools) => Arc::new(tools),
            Err(e) => {
                warn!(error = %e, "Failed to list external tools");
                return Err(e);
            }
        };

        *entry = Some(CatalogEntry {
            tools: tools.clone(),
            fetched_at: Instant::now(),
        });
        if let Ok(mut snapshot) = self.snapshot.write() {
            *snapshot = tools.clone();
        }
        Ok(tools)
    }

    /// Last successfully fetched catalog, possibly stale or empty.
    pub fn cached(&self) -> Arc<Vec<ToolDefinition>> {
        self.snapshot
            .read()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Force the next [`tools`](Self::tools) call to hit the source.
    pub async fn invalidate(&self) {
        *self.entry.lock().await = None;
    }

    /// Whether the (possibly refreshed) catalog offers `name`.
    pub async fn contains(&self, name: &str) -> Result<bool, ToolError> {
        Ok(self.tools().await?.iter().any(|t| t.name == name))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Source with a fixed catalog that counts listings.
    pub(crate) struct CountingSource {
        pub tools: Vec<&'static str>,
        pub listings: AtomicU32,
    }

    impl CountingSource {
        pub(crate) fn new(tools: Vec<&'static str>) -> Self {
            Self {
                tools,
                listings: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl ExternalToolSource for CountingSource {
        async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ToolError> {
            self.listings.fetch_add(1, Ordering::SeqCst);
            // Slow enough that concurrent callers overlap.
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(self
                .tools
                .iter()
                .map(|name| ToolDefinition {
                    name: name.to_string(),
                    description: format!("remote {name}"),
                    parameters: serde_json::json!({"type": "object"}),
                })
                .collect())
        }

        async fn execute(
            &self,
            name: &str,
            args: serde_json::Value,
        ) -> Result<serde_json::Value, ToolError> {
            Ok(serde_json::json!({ "tool": name, "args": args }))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn listing_is_cached_until_ttl() {
        let source = Arc::new(CountingSource::new(vec!["search_web"]));
        let cache = ToolCatalogCache::new(source.clone(), Duration::from_secs(60));

        assert_eq!(cache.tools().await.unwrap().len(), 1);
        assert_eq!(cache.tools().await.unwrap().len(), 1);
        assert_eq!(source.listings.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        cache.tools().await.unwrap();
        assert_eq!(source.listings.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_refreshes_are_single_flight() {
        let source = Arc::new(CountingSource::new(vec!["a", "b"]));
        let cache = Arc::new(ToolCatalogCache::new(source.clone(), Duration::from_secs(60)));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.tools().await.map(|t| t.len()) })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 2);
        }
        assert_eq!(source.listings.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_forces_refresh() {
        let source = Arc::new(CountingSource::new(vec!["a"]));
        let cache = ToolCatalogCache::new(source.clone(), Duration::from_secs(3600));
        assert!(cache.cached().is_empty());

        assert!(cache.contains("a").await.unwrap());
        assert_eq!(cache.cached().len(), 1);
        cache.invalidate().await;
        assert!(!cache.contains("b").await.unwrap());
        assert_eq!(source.listings.load(Ordering::SeqCst), 2);
    }
}
