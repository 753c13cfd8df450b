//! Provider router: resolves a configured provider name to its adapter and
//! call config.

use crate::adapter::{ProviderAdapter, adapter_for};
use convoy_config::{AppConfig, ConfigError};
use convoy_core::provider::{ProviderConfig, ProviderKind};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Named backends available to the agent loop.
pub struct ProviderRouter {
    routes: BTreeMap<String, ProviderConfig>,
    default_provider: String,
}

impl ProviderRouter {
    /// Create a new router with a default provider.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            routes: BTreeMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// Register a backend under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, config: ProviderConfig) {
        self.routes.insert(name.into(), config);
    }

    pub fn default_name(&self) -> &str {
        &self.default_provider
    }

    /// Config of a named backend, or the default one.
    pub fn get(&self, name: Option<&str>) -> Option<&ProviderConfig> {
        self.routes.get(name.unwrap_or(&self.default_provider))
    }

    /// Adapter and config for a named backend, or the default one.
    pub fn resolve(&self, name: Option<&str>) -> Option<(Arc<dyn ProviderAdapter>, ProviderConfig)> {
        self.get(name)
            .map(|config| (adapter_for(config.provider), config.clone()))
    }

    /// All registered names with their configs, sorted by name.
    pub fn list(&self) -> impl Iterator<Item = (&str, &ProviderConfig)> {
        self.routes.iter().map(|(name, config)| (name.as_str(), config))
    }
}

/// Build routes for every configured entry plus each built-in dialect.
pub fn build_from_config(config: &AppConfig) -> Result<ProviderRouter, ConfigError> {
    let mut router = ProviderRouter::new(&config.default_provider);

    for name in config.providers.keys() {
        router.register(name.clone(), config.provider_config(Some(name), None)?);
    }

    for kind in ProviderKind::ALL {
        if !router.routes.contains_key(kind.as_str()) {
            router.register(kind.as_str(), config.provider_config(Some(kind.as_str()), None)?);
        }
    }

    // The default may be a dialect alias such as "claude".
    if !router.routes.contains_key(&config.default_provider) {
        let resolved = config.provider_config(None, None)?;
        router.register(config.default_provider.clone(), resolved);
    }

    Ok(router)
}
