//! Configuration management for Kaien
//!
//! Loads and saves agent, model, sandbox and tool settings as JSON.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod paths;

pub use paths::{config_path, data_dir, expand_home, workspace_path};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("◆ CONFIG IO ERROR: {0}")]
    Io(#[from] std::io::Error),

    #[error("◆ CONFIG PARSE ERROR: {0}")]
    Json(#[from] serde_json::Error),

    #[error("◆ CONFIG NOT FOUND: {0}")]
    NotFound(PathBuf),

    #[error("◆ INVALID VALUE FOR {key}: {value}")]
    InvalidValue { key: String, value: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Agent loop parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefaults {
    #[serde(default = "default_workspace")]
    pub workspace: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Tool dispatches allowed within one user turn
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    #[serde(default = "default_session_max_messages")]
    pub session_max_messages: usize,
    /// History messages replayed to the model each turn
    #[serde(default = "default_history_messages")]
    pub history_messages: usize,
    /// Memories recalled into the system prompt
    #[serde(default = "default_memory_results")]
    pub memory_results: usize,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            max_steps: default_max_steps(),
            session_max_messages: default_session_max_messages(),
            history_messages: default_history_messages(),
            memory_results: default_memory_results(),
        }
    }
}

fn default_workspace() -> String {
    "~/.kaien/workspace".to_string()
}

fn default_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_steps() -> u32 {
    10
}

fn default_session_max_messages() -> usize {
    100
}

fn default_history_messages() -> usize {
    20
}

fn default_memory_results() -> usize {
    2
}

/// Model endpoint (any OpenAI-compatible API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: default_api_base(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_api_base() -> String {
    "http://localhost:11434/v1".to_string()
}

fn default_request_timeout() -> u64 {
    120
}

/// Shell execution limits and command allow-lists
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default = "default_allow_shell")]
    pub allow_shell: bool,
    #[serde(default = "default_shell_timeout")]
    pub shell_timeout_secs: u64,
    #[serde(default = "default_osint_timeout")]
    pub osint_timeout_secs: u64,
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
    #[serde(default = "default_osint_commands")]
    pub osint_commands: Vec<String>,
    #[serde(default = "default_shell_commands")]
    pub shell_commands: Vec<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            allow_shell: default_allow_shell(),
            shell_timeout_secs: default_shell_timeout(),
            osint_timeout_secs: default_osint_timeout(),
            max_output_bytes: default_max_output_bytes(),
            osint_commands: default_osint_commands(),
            shell_commands: default_shell_commands(),
        }
    }
}

fn default_allow_shell() -> bool {
    true
}

fn default_shell_timeout() -> u64 {
    60
}

fn default_osint_timeout() -> u64 {
    15
}

fn default_max_output_bytes() -> usize {
    10_000
}

/// Reconnaissance commands
pub const OSINT_COMMANDS: &[&str] = &["ping", "curl", "whois", "nslookup", "nmap", "ls", "grep"];

/// Administrative file and shell helpers
pub const SHELL_COMMANDS: &[&str] = &["ls", "mkdir", "cd", "pwd", "echo", "cat", "grep", "find"];

fn default_osint_commands() -> Vec<String> {
    OSINT_COMMANDS.iter().map(|c| c.to_string()).collect()
}

fn default_shell_commands() -> Vec<String> {
    SHELL_COMMANDS.iter().map(|c| c.to_string()).collect()
}

/// Tool enable/disable switches
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolsConfig {
    /// Tool names registered but disabled
    #[serde(default)]
    pub disabled: Vec<String>,
}

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentDefaults,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

impl Config {
    /// Load from the default location
    pub async fn load() -> Result<Self> {
        let path = config_path();
        Self::load_from(&path).await
    }

    /// Load from specific location
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("◆ NO CONFIG AT {:?}, USING DEFAULTS", path);
            return Ok(Config::default());
        }

        debug!("◆ LOADING CONFIG FROM {:?}", path);
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save to the default location
    pub async fn save(&self) -> Result<()> {
        let path = config_path();
        self.save_to(&path).await
    }

    /// Save to specific location
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        debug!("◆ WRITING CONFIG TO {:?}", path);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Apply `LLM_BASE_URL`, `LLM_MODEL`, `LLM_API_KEY` and `KAIEN_MAX_STEPS`
    /// from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base) = lookup("LLM_BASE_URL") {
            self.llm.api_base = base;
        }
        if let Some(model) = lookup("LLM_MODEL") {
            self.agent.model = model;
        }
        if let Some(key) = lookup("LLM_API_KEY") {
            self.llm.api_key = key;
        }
        if let Some(steps) = lookup("KAIEN_MAX_STEPS") {
            self.agent.max_steps = steps
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue {
                    key: "KAIEN_MAX_STEPS".to_string(),
                    value: steps.clone(),
                })?;
        }
        Ok(())
    }

    /// Resolved workspace directory
    pub fn workspace_path(&self) -> PathBuf {
        expand_home(&self.agent.workspace)
    }

    /// API key, if one is set
    pub fn api_key(&self) -> Option<String> {
        if self.llm.api_key.is_empty() {
            None
        } else {
            Some(self.llm.api_key.clone())
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key().is_some()
    }

    pub fn default_model(&self) -> String {
        self.agent.model.clone()
    }

    pub fn max_steps(&self) -> u32 {
        self.agent.max_steps
    }

    pub fn session_max_messages(&self) -> usize {
        self.agent.session_max_messages
    }

    /// Whether a tool was switched off in config
    pub fn is_tool_disabled(&self, name: &str) -> bool {
        self.tools.disabled.iter().any(|d| d == name)
    }
}

/// Create config and workspace if they do not exist
pub async fn init() -> Result<Config> {
    let config_path = config_path();

    if config_path.exists() {
        warn!("◆ CONFIG ALREADY EXISTS AT {:?}", config_path);
    } else {
        let config = Config::default();
        config.save().await?;
        info!("◆ CONFIG CREATED AT {:?}", config_path);
    }

    let config = Config::load().await?;
    let workspace = config.workspace_path();
    tokio::fs::create_dir_all(&workspace).await?;
    info!("◆ WORKSPACE READY AT {:?}", workspace);

    Ok(config)
}
