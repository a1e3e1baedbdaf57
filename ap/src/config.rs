//! Autopilot configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::Source;

/// Main Autopilot configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level used when `--log-level` is not given
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Command dispatch settings
    pub dispatch: DispatchConfig,

    /// Plan execution settings
    pub executor: ExecutorConfig,

    /// JSONL event log settings
    pub events: EventsConfig,

    /// Where clinic data comes from
    pub clinic: ClinicConfig,
}

impl Config {
    /// Check settings that depend on the environment
    ///
    /// Only the LLM backend needs anything from the environment.
    pub fn validate(&self) -> Result<()> {
        if self.dispatch.backend == Backend::Llm && std::env::var(&self.llm.api_key_env).is_err() {
            return Err(eyre::eyre!(
                "LLM API key not found. Set the {} environment variable.",
                self.llm.api_key_env
            ));
        }
        if self.dispatch.max_clarification_rounds == 0 {
            return Err(eyre::eyre!("dispatch.max-clarification-rounds must be at least 1"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    ///
    /// An explicit path must load. Otherwise the first readable file from
    /// [`Config::search_paths`] wins, then defaults.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::search_paths().into_iter().filter(|p| p.exists()) {
            match Self::load_from_file(&candidate) {
                Ok(config) => return Ok(config),
                Err(e) => tracing::warn!(path = %candidate.display(), error = %e, "Skipping unreadable config"),
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// `./.autopilot.yml`, then `<config_dir>/autopilot/autopilot.yml`
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".autopilot.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("autopilot").join("autopilot.yml"));
        }
        paths
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!(path = %path.display(), "Loaded config");
        Ok(config)
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name (only "anthropic" supported)
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl LlmConfig {
    /// Read the API key from the configured environment variable
    pub fn get_api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env).context(format!("{} is not set", self.api_key_env))
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 4096,
            timeout_ms: 60_000,
        }
    }
}

/// Which planner/reasoner pair handles commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Deterministic keyword rules, no network
    #[default]
    Rules,
    /// LLM tool calls via the configured provider
    Llm,
}

/// Command dispatch settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub backend: Backend,

    /// Clarification rounds allowed per command
    #[serde(rename = "max-clarification-rounds")]
    pub max_clarification_rounds: u32,

    /// Recent commands kept per session
    #[serde(rename = "recent-commands")]
    pub recent_commands: usize,

    /// Attribute plans to the autopilot instead of the user
    #[serde(rename = "autopilot-mode")]
    pub autopilot_mode: bool,

    /// Surface stamped on every plan
    pub source: Source,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Rules,
            max_clarification_rounds: 3,
            recent_commands: 10,
            autopilot_mode: false,
            source: Source::Cmdk,
        }
    }
}

/// Plan execution settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Per-step timeout in milliseconds (none when absent)
    #[serde(rename = "step-timeout-ms")]
    pub step_timeout_ms: Option<u64>,

    /// Undo completed steps automatically when a step fails
    #[serde(rename = "rollback-on-failure")]
    pub rollback_on_failure: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            step_timeout_ms: Some(10_000),
            rollback_on_failure: true,
        }
    }
}

/// JSONL event log settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub enabled: bool,

    /// Directory holding one `<stream-id>/events.jsonl` per plan or session
    pub dir: PathBuf,
}

impl Default for EventsConfig {
    fn default() -> Self {
        let dir = dirs::data_local_dir()
            .map(|d| d.join("autopilot").join("events"))
            .unwrap_or_else(|| PathBuf::from(".autopilot/events"));
        Self { enabled: false, dir }
    }
}

/// Clinic data source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClinicConfig {
    /// YAML or JSON clinic snapshot; the demo practice is used when absent
    #[serde(rename = "snapshot-path")]
    pub snapshot_path: Option<PathBuf>,
}
