//! Configuration management.
//!
//! nodeflow configuration can come from:
//! - Environment variables (NODEFLOW_*)
//! - Config file (~/.config/nodeflow/config.toml)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// nodeflow configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,

    /// HTTP agent integration
    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub webhook: WebhookConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Engine and scheduler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Scheduler tick resolution (milliseconds)
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Run timeout for workflows without `settings.timeout` (milliseconds)
    #[serde(default)]
    pub default_timeout_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            default_timeout_ms: None,
        }
    }
}

fn default_tick_ms() -> u64 {
    1000
}

/// HTTP agent configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Endpoint receiving `{agentId, instruction}`
    #[serde(default = "default_agent_endpoint")]
    pub endpoint: String,

    /// Timeout for agent calls (seconds)
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            endpoint: default_agent_endpoint(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

fn default_agent_endpoint() -> String {
    "http://localhost:3000/api/agents/execute".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

/// Webhook node configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Default request timeout (seconds)
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Permit calls to localhost and private networks
    #[serde(default)]
    pub allow_internal_urls: bool,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            allow_internal_urls: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from the default location plus environment.
    ///
    /// A missing or unreadable file yields defaults.
    pub fn load() -> Self {
        let mut config = Self::default();

        let path = Self::config_dir().join("config.toml");
        if let Ok(partial) = Self::load_partial_from_path(&path) {
            config.apply_partial(partial);
        }

        config.apply_env_overrides();
        config
    }

    /// Load an explicit config file plus environment. Errors are reported.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let partial: PartialConfig = toml::from_str(&content)?;

        let mut config = Self::default();
        config.apply_partial(partial);
        config.apply_env_overrides();
        Ok(config)
    }

    /// Get the config directory.
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("nodeflow"))
            .unwrap_or_else(|| PathBuf::from(".nodeflow"))
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(parsed) = var("NODEFLOW_TICK_MS").and_then(|v| v.parse::<u64>().ok()) {
            self.engine.tick_ms = parsed;
        }
        if let Some(parsed) = var("NODEFLOW_DEFAULT_TIMEOUT_MS").and_then(|v| v.parse::<u64>().ok())
        {
            self.engine.default_timeout_ms = Some(parsed);
        }
        if let Some(endpoint) = var("NODEFLOW_AGENT_ENDPOINT") {
            self.agent.endpoint = endpoint;
        }
        if let Some(parsed) =
            var("NODEFLOW_AGENT_TIMEOUT_SECONDS").and_then(|v| v.parse::<u64>().ok())
        {
            self.agent.timeout_seconds = parsed;
        }
        if let Some(parsed) =
            var("NODEFLOW_WEBHOOK_TIMEOUT_SECONDS").and_then(|v| v.parse::<u64>().ok())
        {
            self.webhook.timeout_seconds = parsed;
        }
        if let Some(flag) = var("NODEFLOW_ALLOW_INTERNAL_URLS") {
            self.webhook.allow_internal_urls = flag.eq_ignore_ascii_case("true");
        }
        if let Some(level) = var("NODEFLOW_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(flag) = var("NODEFLOW_LOG_JSON") {
            self.logging.json = flag.eq_ignore_ascii_case("true");
        }
    }

    fn load_partial_from_path(path: &Path) -> std::result::Result<PartialConfig, ()> {
        let content = std::fs::read_to_string(path).map_err(|_| ())?;
        toml::from_str(&content).map_err(|_| ())
    }

    fn apply_partial(&mut self, partial: PartialConfig) {
        if let Some(engine) = partial.engine {
            self.engine = engine;
        }
        if let Some(agent) = partial.agent {
            self.agent = agent;
        }
        if let Some(webhook) = partial.webhook {
            self.webhook = webhook;
        }
        if let Some(logging) = partial.logging {
            self.logging = logging;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    engine: Option<EngineConfig>,
    agent: Option<AgentConfig>,
    webhook: Option<WebhookConfig>,
    logging: Option<LoggingConfig>,
}
