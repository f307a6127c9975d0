//! Configuration management for Travai
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::citations::CitationPolicy;
use crate::conversation::DEFAULT_GREETING;
use crate::error::{Result, TravaiError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for Travai
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Guide server connection settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Streaming display settings
    #[serde(default)]
    pub stream: StreamConfig,
    /// Citation handling
    #[serde(default)]
    pub citations: CitationsConfig,
    /// Interactive chat settings
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Guide server connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Root URL of the guide server
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key sent in the `X-API-Key` header
    ///
    /// When unset the key is read from the system keyring.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Timeout for thread listing, history, rename and delete calls
    ///
    /// Streaming turns have no timeout of their own.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

fn default_base_url() -> String {
    "http://localhost:2024".to_string()
}

fn default_request_timeout_seconds() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

/// Typewriter and title settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Interval between reveal ticks in milliseconds
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Characters revealed per tick
    #[serde(default = "default_chars_per_tick")]
    pub chars_per_tick: usize,

    /// Characters of the first message used as a new thread's title
    #[serde(default = "default_title_max_chars")]
    pub title_max_chars: usize,
}

fn default_tick_interval_ms() -> u64 {
    10
}

fn default_chars_per_tick() -> usize {
    2
}

fn default_title_max_chars() -> usize {
    30
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            chars_per_tick: default_chars_per_tick(),
            title_max_chars: default_title_max_chars(),
        }
    }
}

impl StreamConfig {
    /// Tick interval as a [`Duration`]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Citation handling
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CitationsConfig {
    /// Which cited pages are kept
    #[serde(default)]
    pub policy: CitationPolicy,
}

/// Interactive chat settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Assistant message shown in a conversation with no history
    #[serde(default = "default_greeting")]
    pub greeting: String,
}

fn default_greeting() -> String {
    DEFAULT_GREETING.to_string()
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            greeting: default_greeting(),
        }
    }
}

impl Config {
    /// Load configuration from file, environment, and CLI
    ///
    /// A missing file is not an error; defaults are used instead.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| TravaiError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| TravaiError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(base_url) = std::env::var("TRAVAI_BASE_URL") {
            tracing::debug!(base_url = %base_url, "Env override: TRAVAI_BASE_URL");
            self.server.base_url = base_url;
        }

        if let Ok(api_key) = std::env::var("TRAVAI_API_KEY") {
            if !api_key.trim().is_empty() {
                tracing::debug!("Env override: TRAVAI_API_KEY");
                self.server.api_key = Some(api_key);
            }
        }

        if let Ok(interval) = std::env::var("TRAVAI_TICK_INTERVAL_MS") {
            match interval.parse::<u64>() {
                Ok(value) => self.stream.tick_interval_ms = value,
                Err(_) => tracing::warn!("Invalid TRAVAI_TICK_INTERVAL_MS: {}", interval),
            }
        }

        if let Ok(chars) = std::env::var("TRAVAI_CHARS_PER_TICK") {
            match chars.parse::<usize>() {
                Ok(value) => self.stream.chars_per_tick = value,
                Err(_) => tracing::warn!("Invalid TRAVAI_CHARS_PER_TICK: {}", chars),
            }
        }

        if let Ok(policy) = std::env::var("TRAVAI_CITATION_POLICY") {
            match CitationPolicy::parse_str(&policy) {
                Some(value) => self.citations.policy = value,
                None => tracing::warn!(
                    "Invalid citation policy: {}, keeping {:?}",
                    policy,
                    self.citations.policy
                ),
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(base_url) = &cli.base_url {
            self.server.base_url = base_url.clone();
        }
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.server.base_url).map_err(|e| {
            TravaiError::Config(format!(
                "server.base_url is not a valid URL ({}): {}",
                self.server.base_url, e
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TravaiError::Config(format!(
                "server.base_url must use http or https, got {}",
                url.scheme()
            ))
            .into());
        }

        if self.server.request_timeout_seconds == 0 {
            return Err(TravaiError::Config(
                "server.request_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.stream.tick_interval_ms == 0 || self.stream.tick_interval_ms > 1000 {
            return Err(TravaiError::Config(
                "stream.tick_interval_ms must be between 1 and 1000".to_string(),
            )
            .into());
        }

        if self.stream.chars_per_tick == 0 {
            return Err(TravaiError::Config(
                "stream.chars_per_tick must be greater than 0".to_string(),
            )
            .into());
        }

        if self.stream.title_max_chars == 0 {
            return Err(TravaiError::Config(
                "stream.title_max_chars must be greater than 0".to_string(),
            )
            .into());
        }

        Ok(())
    }
}
