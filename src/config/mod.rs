//! Configuration system (layered: explicit setters > env > config file).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::Deserialize;

use crate::agent_loop::limits::{LoopLimits, MalformedToolCallPolicy};
use crate::error::{Result, SluiceError};
use crate::models::ModelSpec;

/// Env var naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "SLUICE_CONFIG";
/// Env var holding the default `provider:model`.
pub const MODEL_ENV: &str = "SLUICE_MODEL";

const API_KEY_ENV: [(&str, &str); 2] = [
    ("ANTHROPIC_API_KEY", "anthropic"),
    ("OPENAI_API_KEY", "openai"),
];
const BASE_URL_ENV: [(&str, &str); 2] = [
    ("ANTHROPIC_BASE_URL", "anthropic"),
    ("OPENAI_BASE_URL", "openai"),
];

/// Layered configuration for Sluice.
///
/// Credentials and base URLs are shared between clones, so a config handed
/// to the server can still be updated with `set_api_key`.
#[derive(Debug, Clone, Default)]
pub struct SluiceConfig {
    api_keys: Arc<RwLock<HashMap<String, String>>>,
    base_urls: Arc<RwLock<HashMap<String, String>>>,
    model: Option<String>,
    limits: LoopLimits,
}

/// On-disk shape of `config.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    model: Option<String>,
    limits: FileLimits,
    providers: HashMap<String, FileProvider>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileLimits {
    max_iterations: Option<usize>,
    request_budget_ms: Option<u64>,
    stream_idle_timeout_ms: Option<u64>,
    tool_timeout_ms: Option<u64>,
    max_tool_result_bytes: Option<usize>,
    malformed_tool_calls: Option<MalformedToolCallPolicy>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileProvider {
    api_key: Option<String>,
    base_url: Option<String>,
}

impl SluiceConfig {
    /// Create an empty config with default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from environment variables (and `.env` if present).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::new().with_env_overrides()
    }

    /// Parse a TOML config document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: FileConfig = toml::from_str(raw)
            .map_err(|e| SluiceError::Configuration(format!("invalid config: {e}")))?;
        Self::from_file_config(file)
    }

    /// Read a TOML config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SluiceError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Full layered load: config file (from `SLUICE_CONFIG`, else the
    /// platform config dir if the file exists), then `.env` and the process
    /// environment on top.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let base = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => match default_config_path() {
                Some(path) if path.is_file() => Self::from_file(path)?,
                _ => Self::new(),
            },
        };
        Ok(base.with_env_overrides())
    }

    /// Apply environment variables over the current values.
    pub fn with_env_overrides(mut self) -> Self {
        for (env_var, provider) in API_KEY_ENV {
            if let Ok(key) = std::env::var(env_var) {
                self.set_api_key(provider, key);
            }
        }
        for (env_var, provider) in BASE_URL_ENV {
            if let Ok(url) = std::env::var(env_var) {
                self.set_base_url(provider, url);
            }
        }
        if let Ok(model) = std::env::var(MODEL_ENV) {
            if !model.trim().is_empty() {
                self.model = Some(model.trim().to_string());
            }
        }
        self.limits = self.limits.with_env_overrides();
        self
    }

    fn from_file_config(file: FileConfig) -> Result<Self> {
        let mut config = Self::new();
        for (name, provider) in file.providers {
            if let Some(key) = provider.api_key {
                config.set_api_key(&name, key);
            }
            if let Some(url) = provider.base_url {
                config.set_base_url(&name, url);
            }
        }
        if let Some(model) = file.model {
            model.parse::<ModelSpec>()?;
            config.model = Some(model);
        }

        let limits = &mut config.limits;
        let file_limits = file.limits;
        if let Some(n) = file_limits.max_iterations {
            limits.max_iterations = positive("limits.max_iterations", n)?;
        }
        if let Some(ms) = file_limits.request_budget_ms {
            limits.request_budget = positive_ms("limits.request_budget_ms", ms)?;
        }
        if let Some(ms) = file_limits.stream_idle_timeout_ms {
            limits.stream_idle_timeout = positive_ms("limits.stream_idle_timeout_ms", ms)?;
        }
        if let Some(ms) = file_limits.tool_timeout_ms {
            limits.tool_timeout = positive_ms("limits.tool_timeout_ms", ms)?;
        }
        if let Some(bytes) = file_limits.max_tool_result_bytes {
            limits.max_tool_result_bytes = positive("limits.max_tool_result_bytes", bytes)?;
        }
        if let Some(policy) = file_limits.malformed_tool_calls {
            limits.malformed_tool_calls = policy;
        }
        Ok(config)
    }

    pub fn set_api_key(&self, provider: &str, key: String) {
        self.api_keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(provider.to_string(), key);
    }

    pub fn get_api_key(&self, provider: &str) -> Option<String> {
        self.api_keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(provider)
            .cloned()
    }

    pub fn set_base_url(&self, provider: &str, url: String) {
        self.base_urls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(provider.to_string(), url);
    }

    pub fn get_base_url(&self, provider: &str) -> Option<String> {
        self.base_urls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(provider)
            .cloned()
    }

    pub fn has_credentials(&self, provider: &str) -> bool {
        self.get_api_key(provider).is_some()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// The configured default model, parsed.
    pub fn model(&self) -> Result<ModelSpec> {
        self.model
            .as_deref()
            .ok_or_else(|| {
                SluiceError::Configuration(format!(
                    "no model configured; set {MODEL_ENV} or `model` in the config file"
                ))
            })?
            .parse()
    }

    pub fn with_limits(mut self, limits: LoopLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> LoopLimits {
        self.limits
    }
}

/// `config.toml` in the platform config directory.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "sluice", "sluice")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

fn positive(field: &str, value: usize) -> Result<usize> {
    if value == 0 {
        return Err(SluiceError::Configuration(format!("{field} must be positive")));
    }
    Ok(value)
}

fn positive_ms(field: &str, value: u64) -> Result<Duration> {
    if value == 0 {
        return Err(SluiceError::Configuration(format!("{field} must be positive")));
    }
    Ok(Duration::from_millis(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_sets_providers_model_and_limits() {
        let config = SluiceConfig::from_toml_str(
            r#"
            model = "openai:gpt-4o-mini"

            [limits]
            max_iterations = 3
            request_budget_ms = 5000
            malformed_tool_calls = "omit"

            [providers.openai]
            api_key = "sk-file"
            base_url = "http://localhost:9000/v1"
            "#,
        )
        .unwrap();

        assert_eq!(config.get_api_key("openai").as_deref(), Some("sk-file"));
        assert_eq!(
            config.get_base_url("openai").as_deref(),
            Some("http://localhost:9000/v1")
        );
        assert_eq!(config.model().unwrap().model_id, "gpt-4o-mini");
        let limits = config.limits();
        assert_eq!(limits.max_iterations, 3);
        assert_eq!(limits.request_budget, Duration::from_secs(5));
        assert_eq!(limits.malformed_tool_calls, MalformedToolCallPolicy::Omit);
        assert_eq!(limits.max_tool_result_bytes, 16384);
    }

    #[test]
    fn zero_limits_are_rejected() {
        let err = SluiceConfig::from_toml_str("[limits]\nmax_iterations = 0\n").unwrap_err();
        assert!(matches!(err, SluiceError::Configuration(_)));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(SluiceConfig::from_toml_str("[limits]\nmax_iteration = 2\n").is_err());
    }

    #[test]
    fn clones_share_credentials() {
        let config = SluiceConfig::new();
        let clone = config.clone();
        config.set_api_key("anthropic", "sk-ant".into());
        assert!(clone.has_credentials("anthropic"));
    }

    #[test]
    fn missing_model_is_a_configuration_error() {
        assert!(matches!(
            SluiceConfig::new().model(),
            Err(SluiceError::Configuration(_))
        ));
    }
}
