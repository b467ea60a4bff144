use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    // Generation endpoint (OpenAI-compatible or Cerebras-style)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Request timeout in seconds; values below 5 are clamped up by the client.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    // Turn behavior
    #[serde(default = "default_context_messages")]
    pub context_messages: usize,

    // Consumed by presentation/export collaborators, not by the core
    #[serde(default = "default_view_messages")]
    pub view_messages: usize,
    #[serde(default = "default_export_max_messages")]
    pub export_max_messages: usize,

    // Per-identity conversation databases live under this directory
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_endpoint() -> String {
    "https://api.cerebras.net/v1/generate".to_string()
}

fn default_model() -> String {
    "llama-3.3-70b".to_string()
}

fn default_max_tokens() -> u32 {
    512
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_context_messages() -> usize {
    8
}

fn default_view_messages() -> usize {
    20
}

fn default_export_max_messages() -> usize {
    1000
}

fn default_data_dir() -> String {
    "conversations".to_string()
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: String::new(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_timeout_seconds(),
            context_messages: default_context_messages(),
            view_messages: default_view_messages(),
            export_max_messages: default_export_max_messages(),
            data_dir: default_data_dir(),
        }
    }
}

impl AssistantConfig {
    /// Get the directory containing the executable
    fn get_base_dir() -> PathBuf {
        match std::env::current_exe() {
            Ok(exe_path) => exe_path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".")),
            Err(_) => PathBuf::from("."),
        }
    }

    /// Get the path to the config file (relative to executable)
    pub fn config_path() -> PathBuf {
        Self::get_base_dir().join("colloquy_config.toml")
    }

    /// Load config from colloquy_config.toml (next to executable)
    pub fn load() -> Self {
        let path = Self::config_path();

        if let Ok(contents) = fs::read_to_string(&path) {
            match toml::from_str::<AssistantConfig>(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {:?}", path);
                    return config;
                }
                Err(e) => {
                    tracing::error!("Failed to parse {:?}: {}", path, e);
                }
            }
        }

        tracing::warn!("No config file found, using defaults + env vars");
        Self::from_env()
    }

    /// Save config to file (next to executable)
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();

        let toml_string = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, toml_string)
            .with_context(|| format!("Failed to write config to {:?}", path))?;

        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Load from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(endpoint) = env::var("COLLOQUY_ENDPOINT") {
            config.endpoint = endpoint;
        }

        if let Ok(key) = env::var("COLLOQUY_API_KEY") {
            config.api_key = key;
        }

        if let Ok(model) = env::var("COLLOQUY_MODEL") {
            config.model = model;
        }

        if let Ok(tokens) = env::var("COLLOQUY_MAX_TOKENS") {
            if let Ok(tokens) = tokens.parse() {
                config.max_tokens = tokens;
            }
        }

        if let Ok(timeout) = env::var("COLLOQUY_TIMEOUT_SECONDS") {
            if let Ok(seconds) = timeout.parse() {
                config.timeout_seconds = seconds;
            }
        }

        if let Ok(context) = env::var("COLLOQUY_CONTEXT_MESSAGES") {
            if let Ok(count) = context.parse() {
                config.context_messages = count;
            }
        }

        if let Ok(dir) = env::var("COLLOQUY_DATA_DIR") {
            if !dir.trim().is_empty() {
                config.data_dir = dir;
            }
        }

        config
    }
}
