//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.codetutor.toml` files.

use crate::agent::AnalysisOptions;
use crate::llm::OllamaConfig;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".codetutor.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Session store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Code analyser model and prompt settings.
    #[serde(default)]
    pub analyser: AnalyserConfig,

    /// Teacher model settings.
    #[serde(default)]
    pub teacher: ModelConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Teacher chunks buffered between the model and a slow client.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_channel_capacity() -> usize {
    32
}

/// Which session store implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process, lost on restart.
    #[default]
    Memory,
    /// SQLite database file.
    Sqlite,
}

/// Session store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Database file, used by the sqlite backend.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("codetutor.db")
}

/// LLM model settings for one stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,

    /// Ollama API URL.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Chat messages remembered per session (0 disables memory).
    #[serde(default = "default_max_context_messages")]
    pub max_context_messages: usize,

    /// Sessions kept in conversation memory before the least recent is dropped.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            ollama_url: default_ollama_url(),
            temperature: default_temperature(),
            timeout_seconds: default_timeout(),
            max_context_messages: default_max_context_messages(),
            max_sessions: default_max_sessions(),
        }
    }
}

impl ModelConfig {
    pub fn to_ollama_config(&self) -> OllamaConfig {
        OllamaConfig {
            ollama_url: self.ollama_url.clone(),
            model_name: self.model.clone(),
            temperature: self.temperature,
            timeout_seconds: self.timeout_seconds,
            max_context_messages: self.max_context_messages,
            max_sessions: self.max_sessions,
        }
    }

    fn validate(&self, section: &str) -> Result<()> {
        if !self.ollama_url.starts_with("http://") && !self.ollama_url.starts_with("https://") {
            bail!("[{}] ollama_url must start with 'http://' or 'https://'", section);
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            bail!("[{}] temperature must be between 0.0 and 1.0", section);
        }
        if self.timeout_seconds == 0 {
            bail!("[{}] timeout_seconds must be at least 1", section);
        }
        if self.max_sessions == 0 {
            bail!("[{}] max_sessions must be at least 1", section);
        }
        Ok(())
    }
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_timeout() -> u64 {
    300
}

fn default_max_context_messages() -> usize {
    10
}

fn default_max_sessions() -> usize {
    1000
}

/// Analyser settings: the model plus the prompt knobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyserConfig {
    #[serde(flatten)]
    pub model: ModelConfig,

    #[serde(flatten)]
    pub prompt: AnalysisOptions,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// Only values given explicitly on the command line (or via their
    /// environment variables) override the file.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref bind) = args.bind {
            self.server.bind = bind.clone();
        }

        if let Some(ref model) = args.model {
            self.analyser.model.model = model.clone();
            self.teacher.model = model.clone();
        }
        if let Some(ref url) = args.ollama_url {
            self.analyser.model.ollama_url = url.clone();
            self.teacher.ollama_url = url.clone();
        }
        if let Some(timeout) = args.timeout {
            self.analyser.model.timeout_seconds = timeout;
            self.teacher.timeout_seconds = timeout;
        }

        if let Some(ref path) = args.db {
            self.store.backend = StoreBackend::Sqlite;
            self.store.path = path.clone();
        }

        if let Some(level) = args.detail_level {
            self.analyser.prompt.detail_level = level;
        }
        if let Some(focus) = args.focus {
            self.analyser.prompt.educational_focus = focus;
        }
        if let Some(tone) = args.tone {
            self.analyser.prompt.feedback_tone = tone;
        }
        if args.no_code_suggestions {
            self.analyser.prompt.include_code_suggestions = false;
        }
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<()> {
        self.server
            .bind
            .parse::<SocketAddr>()
            .with_context(|| format!("[server] bind is not a socket address: {}", self.server.bind))?;
        if self.server.channel_capacity == 0 {
            bail!("[server] channel_capacity must be at least 1");
        }
        self.analyser.model.validate("analyser")?;
        self.teacher.validate("teacher")?;
        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::prompt::{DetailLevel, FeedbackTone};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.bind, "127.0.0.1:8000");
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.analyser.model.model, "llama3.2:latest");
        assert!(config.analyser.prompt.include_code_suggestions);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[server]
bind = "0.0.0.0:9000"

[store]
backend = "sqlite"
path = "/var/lib/codetutor/tutor.db"

[analyser]
model = "qwen2.5-coder:14b"
temperature = 0.0
detail_level = "maximum"
feedback_tone = "direct"
include_code_suggestions = false

[teacher]
model = "llama3.1:8b"
max_context_messages = 20
max_sessions = 50
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.server.channel_capacity, 32);
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert_eq!(config.analyser.model.model, "qwen2.5-coder:14b");
        assert_eq!(config.analyser.model.temperature, 0.0);
        assert_eq!(config.analyser.prompt.detail_level, DetailLevel::Maximum);
        assert_eq!(config.analyser.prompt.feedback_tone, FeedbackTone::Direct);
        assert!(!config.analyser.prompt.include_code_suggestions);
        assert_eq!(config.teacher.model, "llama3.1:8b");
        assert_eq!(config.teacher.max_context_messages, 20);
        assert_eq!(config.teacher.max_sessions, 50);
        assert_eq!(config.analyser.model.max_sessions, 1000);
        assert_eq!(config.teacher.to_ollama_config().max_sessions, 50);
        assert_eq!(config.teacher.ollama_url, "http://localhost:11434");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.server.bind = "not an address".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.teacher.ollama_url = "localhost:11434".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.analyser.model.temperature = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.teacher.max_sessions = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[server]"));
        assert!(toml_str.contains("[analyser]"));
        assert!(toml_str.contains("[teacher]"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.analyser.prompt, AnalysisOptions::default());
    }
}
