//! Configuration loading, validation, and management for Convoy.
//!
//! Loads configuration from `~/.convoy/config.toml` with environment
//! variable overrides. Validates all settings at load time and resolves
//! named provider entries into an immutable [`ProviderConfig`].

use convoy_core::provider::{ContextLimits, ProviderConfig, ProviderKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.convoy/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Fallback API key for providers without their own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Provider entry (or dialect name) used when none is requested
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Model for the default provider when its entry names none. Other
    /// providers fall back to their dialect's default model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Agent loop limits
    #[serde(default)]
    pub agent: AgentSettings,

    /// Named provider entries
    #[serde(default)]
    pub providers: HashMap<String, ProviderSettings>,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_temperature() -> f32 {
    0.7
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("agent", &self.agent)
            .field("providers", &self.providers)
            .finish()
    }
}

/// One named backend.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Wire dialect; defaults to parsing the entry name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ProviderKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Model context window in tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_limit: Option<u32>,

    /// Tokens reserved for the reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_limit: Option<u32>,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("kind", &self.kind)
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .field("context_limit", &self.context_limit)
            .field("output_limit", &self.output_limit)
            .finish()
    }
}

/// Limits for one agent run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Tool rounds before the loop gives up
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Budget for one model round, tool execution included
    #[serde(default = "default_round_timeout")]
    pub round_timeout_secs: u64,

    /// Budget for the whole run
    #[serde(default = "default_total_timeout")]
    pub total_timeout_secs: u64,

    /// Tokens held back from the prompt budget
    #[serde(default = "default_reserved_buffer")]
    pub reserved_buffer_tokens: u32,

    /// Retries for transient transport failures
    #[serde(default = "default_transient_retries")]
    pub transient_retries: u32,

    /// Fixed delay between transient retries
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

fn default_max_iterations() -> u32 {
    10
}
fn default_round_timeout() -> u64 {
    60
}
fn default_total_timeout() -> u64 {
    600
}
fn default_reserved_buffer() -> u32 {
    1_000
}
fn default_transient_retries() -> u32 {
    3
}
fn default_retry_backoff() -> u64 {
    1_000
}

impl AgentSettings {
    pub fn round_timeout(&self) -> Duration {
        Duration::from_secs(self.round_timeout_secs)
    }

    pub fn total_timeout(&self) -> Duration {
        Duration::from_secs(self.total_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            round_timeout_secs: default_round_timeout(),
            total_timeout_secs: default_total_timeout(),
            reserved_buffer_tokens: default_reserved_buffer(),
            transient_retries: default_transient_retries(),
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.convoy/config.toml).
    ///
    /// Environment overrides:
    /// - `CONVOY_API_KEY` (fallback key)
    /// - `CONVOY_PROVIDER`
    /// - `CONVOY_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("CONVOY_API_KEY").ok();
        }

        if let Ok(provider) = std::env::var("CONVOY_PROVIDER") {
            config.default_provider = provider;
        }

        if let Ok(model) = std::env::var("CONVOY_MODEL") {
            config.default_model = Some(model);
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".convoy")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.default_temperature) {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }

        if self.agent.round_timeout_secs == 0 || self.agent.total_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "agent timeouts must be positive".into(),
            ));
        }

        for (name, settings) in &self.providers {
            if settings.kind.is_none() && name.parse::<ProviderKind>().is_err() {
                return Err(ConfigError::ValidationError(format!(
                    "provider '{name}' needs an explicit `kind`"
                )));
            }
            if let Some(t) = settings.temperature {
                if !(0.0..=2.0).contains(&t) {
                    return Err(ConfigError::ValidationError(format!(
                        "providers.{name}.temperature must be between 0.0 and 2.0"
                    )));
                }
            }
            let limits = settings.context_limits();
            if limits.model_output_limit >= limits.model_context_limit {
                return Err(ConfigError::ValidationError(format!(
                    "providers.{name}: output_limit must be smaller than context_limit"
                )));
            }
        }

        Ok(())
    }

    /// Resolve a provider entry (by name, or the default) into a call config.
    ///
    /// Entries absent from the file fall back to the dialect of the same
    /// name with default endpoint and limits. The API key is taken from the
    /// entry, then the dialect's vendor environment variable, then the
    /// top-level `api_key`. The model is the override, then the entry's,
    /// then the top-level `default_model` (default provider only), then the
    /// dialect's default.
    pub fn provider_config(
        &self,
        name: Option<&str>,
        model: Option<&str>,
    ) -> Result<ProviderConfig, ConfigError> {
        let name = name.unwrap_or(&self.default_provider);
        let fallback = ProviderSettings::default();
        let settings = self.providers.get(name).unwrap_or(&fallback);

        let kind = match settings.kind {
            Some(kind) => kind,
            None => name.parse::<ProviderKind>().map_err(ConfigError::UnknownProvider)?,
        };

        let api_key = settings
            .api_key
            .clone()
            .or_else(|| vendor_key(kind))
            .or_else(|| self.api_key.clone())
            .unwrap_or_default();

        let top_level = if name == self.default_provider {
            self.default_model.clone()
        } else {
            None
        };
        let model = model
            .map(String::from)
            .or_else(|| settings.default_model.clone())
            .or(top_level)
            .unwrap_or_else(|| kind.default_model().to_string());

        let base_url = settings
            .api_url
            .clone()
            .unwrap_or_else(|| kind.default_base_url().to_string());

        Ok(ProviderConfig::new(kind, model, api_key)
            .with_base_url(base_url)
            .with_temperature(settings.temperature.unwrap_or(self.default_temperature))
            .with_context_limits(settings.context_limits()))
    }

    /// Generate a default config TOML string (for `convoy config`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl ProviderSettings {
    pub fn context_limits(&self) -> ContextLimits {
        let defaults = ContextLimits::default();
        ContextLimits {
            model_context_limit: self.context_limit.unwrap_or(defaults.model_context_limit),
            model_output_limit: self.output_limit.unwrap_or(defaults.model_output_limit),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: None,
            default_temperature: default_temperature(),
            agent: AgentSettings::default(),
            providers: HashMap::new(),
        }
    }
}

/// The conventional environment variable for each vendor's key.
fn vendor_key(kind: ProviderKind) -> Option<String> {
    let vars: &[&str] = match kind {
        ProviderKind::OpenAi => &["OPENAI_API_KEY", "OPENROUTER_API_KEY"],
        ProviderKind::Anthropic => &["ANTHROPIC_API_KEY"],
        ProviderKind::Gemini => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
        ProviderKind::Ollama => &[],
    };
    vars.iter().find_map(|v| std::env::var(v).ok())
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
}

impl From<ConfigError> for convoy_core::Error {
    fn from(e: ConfigError) -> Self {
        convoy_core::Error::Config {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.agent.max_iterations, 10);
        assert_eq!(config.agent.round_timeout(), Duration::from_secs(60));
        assert_eq!(config.agent.total_timeout(), Duration::from_secs(600));
        assert_eq!(config.agent.transient_retries, 3);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(parsed.agent.max_iterations, config.agent.max_iterations);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            default_temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_iterations_rejected() {
        let mut config = AppConfig::default();
        config.agent.max_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.default_provider, "openai");
    }

    #[test]
    fn load_from_file_with_providers() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
default_provider = "claude-work"

[agent]
max_iterations = 4
round_timeout_secs = 30

[providers.claude-work]
kind = "anthropic"
api_key = "sk-ant-file"
default_model = "claude-sonnet-4-20250514"
context_limit = 200000
output_limit = 8192

[providers.ollama]
api_url = "http://gpu-box:11434/"
default_model = "llama3.1"
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.agent.max_iterations, 4);
        assert_eq!(config.agent.total_timeout_secs, 600);

        let claude = config.provider_config(None, None).unwrap();
        assert_eq!(claude.provider, ProviderKind::Anthropic);
        assert_eq!(claude.api_key, "sk-ant-file");
        assert_eq!(claude.model, "claude-sonnet-4-20250514");
        assert_eq!(claude.context_limits.model_context_limit, 200_000);
        assert_eq!(claude.base_url, "https://api.anthropic.com");

        let ollama = config.provider_config(Some("ollama"), Some("qwen2.5")).unwrap();
        assert_eq!(ollama.provider, ProviderKind::Ollama);
        assert_eq!(ollama.base_url, "http://gpu-box:11434");
        assert_eq!(ollama.model, "qwen2.5");
    }

    #[test]
    fn top_level_model_applies_to_default_provider_only() {
        let config = AppConfig {
            default_provider: "gemini".into(),
            default_model: Some("gemini-2.5-pro".into()),
            ..AppConfig::default()
        };
        let gemini = config.provider_config(None, None).unwrap();
        assert_eq!(gemini.model, "gemini-2.5-pro");

        let claude = config.provider_config(Some("anthropic"), None).unwrap();
        assert_eq!(claude.model, ProviderKind::Anthropic.default_model());

        let unset = AppConfig::default().provider_config(Some("ollama"), None).unwrap();
        assert_eq!(unset.model, "llama3.1");
    }

    #[test]
    fn unnamed_kind_needs_explicit_kind() {
        let mut config = AppConfig::default();
        config
            .providers
            .insert("my-proxy".into(), ProviderSettings::default());
        assert!(config.validate().is_err());
        assert!(matches!(
            config.provider_config(Some("my-proxy"), None),
            Err(ConfigError::UnknownProvider(_))
        ));
    }

    #[test]
    fn output_limit_must_fit_context() {
        let mut config = AppConfig::default();
        config.providers.insert(
            "openai".into(),
            ProviderSettings {
                context_limit: Some(4_000),
                output_limit: Some(4_000),
                ..ProviderSettings::default()
            },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn provider_settings_debug_redacts_key() {
        let settings = ProviderSettings {
            api_key: Some("sk-live-123".into()),
            ..ProviderSettings::default()
        };
        let debug = format!("{settings:?}");
        assert!(!debug.contains("sk-live-123"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("default_provider"));
        assert!(toml_str.contains("max_iterations"));
    }
}
