//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::streaming::{HubConfig, OverflowPolicy, QueueConfig};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub streaming: StreamingConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ApiConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Streaming connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StreamingConfig {
    /// Idle time before a keepalive ping is sent (seconds)
    #[serde(default = "default_keepalive")]
    pub keepalive_interval_secs: u64,

    /// Events buffered per session before the overflow policy applies
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default)]
    pub overflow_policy: OverflowPolicy,

    /// Maximum number of concurrent streams
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_keepalive() -> u64 {
    30
}

fn default_queue_capacity() -> usize {
    512
}

fn default_max_sessions() -> usize {
    1000
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            keepalive_interval_secs: default_keepalive(),
            queue_capacity: default_queue_capacity(),
            overflow_policy: OverflowPolicy::default(),
            max_sessions: default_max_sessions(),
        }
    }
}

impl StreamingConfig {
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            capacity: self.queue_capacity,
            overflow: self.overflow_policy,
        }
    }

    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            max_sessions: self.max_sessions,
            queue: self.queue_config(),
        }
    }
}

/// Static access tokens
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub tokens: Vec<TokenEntry>,
}

/// One access token and the account it belongs to
#[derive(Debug, Clone, Deserialize)]
pub struct TokenEntry {
    pub token: String,
    pub account_id: String,
    pub username: String,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file. Call [`Config::validate`] once any
    /// overrides have been applied.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("streamgate").join("config.toml")),
            Some(PathBuf::from("/etc/streamgate/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.streaming.keepalive_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "streaming.keepalive_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.streaming.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "streaming.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.streaming.max_sessions == 0 {
            return Err(ConfigError::Invalid(
                "streaming.max_sessions must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        // API overrides
        if let Ok(host) = std::env::var("STREAMGATE_API_HOST") {
            self.api.host = host;
        }
        if let Ok(port) = std::env::var("STREAMGATE_API_PORT") {
            if let Ok(p) = port.parse() {
                self.api.port = p;
            }
        }

        // Streaming overrides
        if let Ok(secs) = std::env::var("STREAMGATE_KEEPALIVE_SECS") {
            if let Ok(s) = secs.parse() {
                self.streaming.keepalive_interval_secs = s;
            }
        }
        if let Ok(capacity) = std::env::var("STREAMGATE_QUEUE_CAPACITY") {
            if let Ok(c) = capacity.parse() {
                self.streaming.queue_capacity = c;
            }
        }
        if let Ok(max) = std::env::var("STREAMGATE_MAX_SESSIONS") {
            if let Ok(m) = max.parse() {
                self.streaming.max_sessions = m;
            }
        }

        // Logging overrides
        if let Ok(level) = std::env::var("STREAMGATE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("STREAMGATE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Streamgate Configuration
#
# Environment variables override these settings:
# - STREAMGATE_API_HOST
# - STREAMGATE_API_PORT
# - STREAMGATE_KEEPALIVE_SECS
# - STREAMGATE_QUEUE_CAPACITY
# - STREAMGATE_MAX_SESSIONS
# - STREAMGATE_LOG_LEVEL
# - STREAMGATE_LOG_FORMAT

[api]
# API server host
host = "0.0.0.0"

# API server port
port = 8090

[streaming]
# Seconds without outbound traffic before a keepalive ping is sent
keepalive_interval_secs = 30

# Events buffered per stream before the overflow policy applies
queue_capacity = 512

# What to do when a stream's queue is full:
# drop_newest (refuse the event) or disconnect (evict the stream)
overflow_policy = "drop_newest"

# Maximum number of concurrent streams
max_sessions = 1000

# Static access tokens
# [[auth.tokens]]
# token = "change-me"
# account_id = "01F8MH1H7YV1Z7D2C8K2730QBF"
# username = "admin"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
