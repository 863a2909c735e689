//! Configuration management for aibot.
//!
//! Configuration is loaded from `~/.config/aibot/config.toml`. Command-line
//! flags override whatever the file says.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::protocol::Options;

/// Environment variable naming the default model.
pub const MODEL_ENV: &str = "OLLAMA_MODEL";

const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a highly experienced and knowledgeable Linux System Administrator and Shell Scripting Expert.
Your role is to assist users with all aspects of Linux system administration, including troubleshooting,
configuration management, user and permission management, package management, shell scripting,
security, performance tuning, and clear explanations of Linux concepts and commands.

Only state facts that are present in the context you were given. If a program version, kernel version or
Linux distribution is not provided, do not make one up. When unsure, say "I don't know about that information"
or "This cannot be confirmed." Do not fabricate data, names, dates, sources or quotes.

Be practical, accurate and concise. When generating scripts or commands, prioritize security and best practices."#;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Ollama server base URL.
    #[serde(default = "default_host")]
    pub host: String,
    /// System prompt used when `--system` is not given.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Decoding parameters.
    #[serde(default)]
    pub options: Options,
    /// Terminal output settings.
    #[serde(default)]
    pub display: Display,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            system_prompt: default_system_prompt(),
            options: Options::default(),
            display: Display::default(),
        }
    }
}

fn default_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

/// How answers are drawn in the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Live re-rendered Markdown.
    Markdown,
    /// Fragments echoed as they arrive.
    Raw,
    /// Fragments echoed one whole word at a time.
    Words,
}

/// Terminal output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Display {
    #[serde(default = "default_mode")]
    pub mode: RenderMode,
    /// Redraws per second of the Markdown view.
    #[serde(default = "default_refresh")]
    pub refresh_per_second: u32,
}

impl Default for Display {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            refresh_per_second: default_refresh(),
        }
    }
}

fn default_mode() -> RenderMode {
    RenderMode::Markdown
}

fn default_refresh() -> u32 {
    4
}

impl Display {
    /// Minimum time between two redraws of the Markdown view.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(1) / self.refresh_per_second.max(1)
    }
}

/// Settings the HTTP transport is built from.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
}

impl Config {
    /// Get the config directory path.
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("aibot"))
            .context("Could not determine config directory")
    }

    /// Get the config file path.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, using defaults if not found.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Save configuration to file.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(path)
    }

    /// Transport settings derived from this configuration.
    pub fn client(&self) -> ClientConfig {
        ClientConfig {
            host: self.host.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.host, "http://localhost:11434");
        assert_eq!(config.display.mode, RenderMode::Markdown);
        assert_eq!(config.options.num_ctx, 8192);
        assert!(config.system_prompt.contains("Linux System Administrator"));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[options]"));
        assert!(toml.contains("mode = \"markdown\""));
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
host = "http://192.168.1.11:11434"

[options]
temperature = 0.2
top_k = 20

[display]
mode = "words"
"#;
        let config = Config::parse(toml).unwrap();
        assert_eq!(config.host, "http://192.168.1.11:11434");
        assert_eq!(config.options.temperature, 0.2);
        assert_eq!(config.options.top_k, 20);
        assert_eq!(config.options.num_ctx, 8192);
        assert_eq!(config.display.mode, RenderMode::Words);
        assert_eq!(config.display.refresh_per_second, 4);
    }

    #[test]
    fn test_refresh_interval() {
        let mut display = Display::default();
        assert_eq!(display.refresh_interval(), Duration::from_millis(250));
        display.refresh_per_second = 0;
        assert_eq!(display.refresh_interval(), Duration::from_secs(1));
    }
}
