pub mod validation;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use self::validation::validate_config;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub base_path: String,
    /// Budget shared by the primary attempt and its fallback.
    #[serde(default = "default_request_deadline_secs")]
    pub request_deadline_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_http_pool_max_idle_per_host")]
    pub http_pool_max_idle_per_host: usize,
    #[serde(default = "default_http_pool_idle_timeout_secs")]
    pub http_pool_idle_timeout_secs: u64,
    #[serde(default)]
    pub http_use_env_proxy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_worker_threads: Option<usize>,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_request_deadline_secs() -> u64 {
    30
}
fn default_connect_timeout_secs() -> u64 {
    5
}
fn default_http_pool_max_idle_per_host() -> usize {
    16
}
fn default_http_pool_idle_timeout_secs() -> u64 {
    15
}

impl ServerConfig {
    #[must_use]
    pub fn request_deadline(&self) -> Duration {
        Duration::from_secs(self.request_deadline_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            base_path: String::new(),
            request_deadline_secs: default_request_deadline_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            http_pool_max_idle_per_host: default_http_pool_max_idle_per_host(),
            http_pool_idle_timeout_secs: default_http_pool_idle_timeout_secs(),
            http_use_env_proxy: false,
            runtime_worker_threads: None,
        }
    }
}

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are ALLChat, an expert academic literacy advisor. \
Your purpose is to help students understand and develop skills in academic literacy.";

/// Direct single-model completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Usually injected from `OPENAI_API_KEY`; never serialized back out.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "gpt-4o".to_string()
}
#[allow(clippy::unnecessary_wraps)]
fn default_system_prompt() -> Option<String> {
    Some(DEFAULT_SYSTEM_PROMPT.to_string())
}

impl DirectConfig {
    /// Credential if present and non-blank.
    #[must_use]
    pub fn credential(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

impl Default for DirectConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            system_prompt: default_system_prompt(),
            temperature: None,
            max_tokens: None,
        }
    }
}

/// Multi-step workflow endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub workflow_id: Option<String>,
    /// Falls back to `direct.base_url` when unset.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_context_turns")]
    pub context_turns: usize,
    /// Slice size for pacing the one-shot workflow text; 0 emits it whole.
    #[serde(default)]
    pub emit_chunk_chars: usize,
}

fn default_context_turns() -> usize {
    6
}

impl WorkflowConfig {
    /// Workflow id when the workflow path is switched on and identified.
    #[must_use]
    pub fn configured_id(&self) -> Option<&str> {
        if !self.enabled {
            return None;
        }
        self.workflow_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            workflow_id: None,
            base_url: None,
            context_turns: default_context_turns(),
            emit_chunk_chars: 0,
        }
    }
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub direct: DirectConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

impl AppConfig {
    #[must_use]
    pub fn workflow_base_url(&self) -> &str {
        self.workflow
            .base_url
            .as_deref()
            .unwrap_or(&self.direct.base_url)
    }
}

/// Overlay process environment onto a parsed config.
///
/// `lookup` is the environment accessor so tests can inject values without
/// touching the real process environment.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

    if let Some(key) = non_empty("OPENAI_API_KEY") {
        config.direct.api_key = Some(key);
    }
    if let Some(model) = non_empty("OPENAI_MODEL") {
        config.direct.model = model;
    }
    if let Some(workflow_id) = non_empty("WORKFLOW_ID") {
        config.workflow.workflow_id = Some(workflow_id);
    }
    if let Some(flag) = non_empty("USE_WORKFLOW") {
        config.workflow.enabled = flag.trim().eq_ignore_ascii_case("true");
    }
    if let Some(port) = non_empty("PORT").and_then(|port| port.trim().parse().ok()) {
        config.server.port = port;
    }
    if let Some(level) = non_empty("LOG_LEVEL") {
        config.features.log_level = level;
    }
}

/// Load configuration from a YAML file, overlay the environment, and validate.
///
/// A missing file is not an error: defaults plus environment are used.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading an existing file fails,
/// [`ConfigError::Yaml`] when parsing fails, or [`ConfigError::Validation`]
/// when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let mut config = match std::fs::read_to_string(path) {
        Ok(contents) => serde_yaml::from_str(&contents)?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => AppConfig::default(),
        Err(err) => return Err(err.into()),
    };
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    validate_config(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_load_example_config() {
        let contents =
            std::fs::read_to_string("config.example.yaml").expect("read example config");
        let config: AppConfig = serde_yaml::from_str(&contents).expect("parse example config");
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.request_deadline_secs, 30);
        assert_eq!(config.workflow.context_turns, 6);
        assert!(config.direct.api_key.is_none());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = load_config("does-not-exist.yaml").expect("defaults");
        assert_eq!(config.server.request_deadline_secs, 30);
        assert_eq!(config.direct.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("OPENAI_API_KEY", "sk-env"),
            ("OPENAI_MODEL", "gpt-4o-mini"),
            ("WORKFLOW_ID", "wf_123"),
            ("USE_WORKFLOW", "TRUE"),
            ("PORT", "5000"),
        ]);
        let mut config = AppConfig::default();
        apply_env_overrides(&mut config, |name| env.get(name).map(ToString::to_string));

        assert_eq!(config.direct.credential(), Some("sk-env"));
        assert_eq!(config.direct.model, "gpt-4o-mini");
        assert_eq!(config.workflow.configured_id(), Some("wf_123"));
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn test_workflow_requires_flag_and_id() {
        let mut workflow = WorkflowConfig {
            workflow_id: Some("wf".to_string()),
            ..WorkflowConfig::default()
        };
        assert_eq!(workflow.configured_id(), None);
        workflow.enabled = true;
        assert_eq!(workflow.configured_id(), Some("wf"));
        workflow.workflow_id = Some("  ".to_string());
        assert_eq!(workflow.configured_id(), None);
    }

    #[test]
    fn test_blank_credential_is_absent() {
        let direct = DirectConfig {
            api_key: Some("   ".to_string()),
            ..DirectConfig::default()
        };
        assert_eq!(direct.credential(), None);
    }

    #[test]
    fn test_workflow_base_url_defaults_to_direct() {
        let mut config = AppConfig::default();
        assert_eq!(config.workflow_base_url(), "https://api.openai.com/v1");
        config.workflow.base_url = Some("http://127.0.0.1:9000".to_string());
        assert_eq!(config.workflow_base_url(), "http://127.0.0.1:9000");
    }
}
