//! Configuration management for AttoClaw
//!
//! Configuration is loaded from `~/.attoclaw/config.json` with environment
//! variable overrides. All types implement serde traits and have sensible
//! defaults so a missing config file yields a working engine.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Main configuration struct for AttoClaw
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Agent engine settings (model, tokens, iterations, memory window)
    pub agent: AgentDefaults,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Default agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentDefaults {
    /// Workspace directory path
    pub workspace: String,
    /// Default model to use
    pub model: String,
    /// Maximum tokens for responses
    pub max_tokens: u32,
    /// Temperature for generation
    pub temperature: f32,
    /// Maximum reason-act iterations per inbound message
    pub max_tool_iterations: u32,
    /// Number of unconsolidated messages that triggers background memory
    /// consolidation; also the history window fed to the LLM.
    pub memory_window: usize,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            workspace: "~/.attoclaw/workspace".to_string(),
            model: "claude-sonnet-4-5-20250929".to_string(),
            max_tokens: 8192,
            temperature: 0.7,
            max_tool_iterations: 20,
            memory_window: 50,
        }
    }
}

/// Log output format selection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Compact human-readable text
    Compact,
    /// Structured JSON lines for log aggregators
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Output format
    pub format: LogFormat,
    /// Default filter level (overridden by `RUST_LOG`)
    pub level: String,
    /// Optional log file path; stderr when unset
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Compact,
            level: "info".to_string(),
            file: None,
        }
    }
}

impl Config {
    /// Returns the AttoClaw configuration directory path (~/.attoclaw)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".attoclaw")
    }

    /// Returns the path to the config file (~/.attoclaw/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path with environment overrides.
    ///
    /// If the config file doesn't exist, returns default configuration.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            Config::default()
        };

        config.apply_env_overrides();

        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables follow the pattern: `ATTOCLAW_AGENT_KEY`
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("ATTOCLAW_AGENT_WORKSPACE") {
            self.agent.workspace = val;
        }
        if let Ok(val) = std::env::var("ATTOCLAW_AGENT_MODEL") {
            self.agent.model = val;
        }
        if let Ok(val) = std::env::var("ATTOCLAW_AGENT_MAX_TOKENS") {
            if let Ok(v) = val.parse() {
                self.agent.max_tokens = v;
            }
        }
        if let Ok(val) = std::env::var("ATTOCLAW_AGENT_TEMPERATURE") {
            if let Ok(v) = val.parse() {
                self.agent.temperature = v;
            }
        }
        if let Ok(val) = std::env::var("ATTOCLAW_AGENT_MAX_TOOL_ITERATIONS") {
            if let Ok(v) = val.parse() {
                self.agent.max_tool_iterations = v;
            }
        }
        if let Ok(val) = std::env::var("ATTOCLAW_AGENT_MEMORY_WINDOW") {
            if let Ok(v) = val.parse() {
                self.agent.memory_window = v;
            }
        }
        if let Ok(val) = std::env::var("ATTOCLAW_LOGGING_LEVEL") {
            self.logging.level = val;
        }
    }

    /// Returns the workspace path with `~` expanded to the home directory.
    pub fn workspace_path(&self) -> PathBuf {
        expand_tilde(&self.agent.workspace)
    }
}

/// Expand a leading `~` or `~/` to the user's home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    }
    if let Some(rest) = path.strip_prefix("~/") {
        return dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest);
    }
    PathBuf::from(path)
}
