//! Configuration management for vibe-state.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::net::IpAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::api::ServerConfig;
use crate::cli::Args;
use crate::history::HistoryBudget;
use crate::memo::IdPrefixes;
use crate::session::{RegistryConfig, DEFAULT_JOURNAL_CAPACITY};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerSection,
    /// Session lifecycle settings.
    pub session: SessionSection,
    /// Prompt history budget.
    pub history: HistorySection,
    /// Fragment id prefixes.
    pub memo: MemoSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Enable graceful shutdown.
    pub graceful_shutdown: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            graceful_shutdown: true,
        }
    }
}

/// Session configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Idle time in milliseconds before a session expires.
    pub ttl_ms: u64,
    /// Maximum number of sessions held at once.
    pub capacity: usize,
    /// Records kept per REST journal.
    pub rest_journal_capacity: usize,
    /// Seconds between background prune passes (0 disables).
    pub sweep_interval_secs: u64,
    /// Name of the session cookie.
    pub cookie_name: String,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            ttl_ms: 24 * 60 * 60 * 1000,
            capacity: 200,
            rest_journal_capacity: DEFAULT_JOURNAL_CAPACITY,
            sweep_interval_secs: 60,
            cookie_name: "sid".to_string(),
        }
    }
}

/// History configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySection {
    /// Most recent entries considered for a prompt.
    pub limit: usize,
    /// Byte ceiling for replayed history.
    pub max_bytes: usize,
}

impl Default for HistorySection {
    fn default() -> Self {
        let budget = HistoryBudget::default();
        Self {
            limit: budget.limit,
            max_bytes: budget.max_bytes,
        }
    }
}

/// Memoizer configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoSection {
    pub component_prefix: String,
    pub style_prefix: String,
}

impl Default for MemoSection {
    fn default() -> Self {
        let prefixes = IdPrefixes::default();
        Self {
            component_prefix: prefixes.component,
            style_prefix: prefixes.style,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace) or a full filter directive.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source.
    ///
    /// Unparseable numeric values are ignored.
    pub fn apply_env_from(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(host) = var("VIBE_STATE_HOST") {
            self.server.host = host;
        }

        if let Some(port) = var("VIBE_STATE_PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }

        if let Some(ttl) = var("VIBE_STATE_SESSION_TTL_MS").and_then(|v| v.parse().ok()) {
            self.session.ttl_ms = ttl;
        }

        if let Some(cap) = var("VIBE_STATE_SESSION_CAP").and_then(|v| v.parse().ok()) {
            self.session.capacity = cap;
        }

        if let Some(limit) = var("VIBE_STATE_HISTORY_LIMIT").and_then(|v| v.parse().ok()) {
            self.history.limit = limit;
        }

        if let Some(bytes) = var("VIBE_STATE_HISTORY_MAX_BYTES").and_then(|v| v.parse().ok()) {
            self.history.max_bytes = bytes;
        }

        if let Some(level) = var("VIBE_STATE_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Some(level) = var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(host) = args.host {
            self.server.host = host.to_string();
        }
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if let Some(ttl) = args.session_ttl_ms {
            self.session.ttl_ms = ttl;
        }
        if let Some(cap) = args.session_cap {
            self.session.capacity = cap;
        }
        if let Some(limit) = args.history_limit {
            self.history.limit = limit;
        }
        if let Some(bytes) = args.history_bytes {
            self.history.max_bytes = bytes;
        }
        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(ref path) = args.config {
            config = Config::from_file(path)?;
        }

        config.apply_env();
        config.apply_args(args);
        config.validate()?;

        Ok(config)
    }

    /// Reject settings the registry cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.ttl_ms == 0 {
            return Err(ConfigError::InvalidValue("session.ttl_ms", "0".into()));
        }
        if self.session.capacity == 0 {
            return Err(ConfigError::InvalidValue("session.capacity", "0".into()));
        }
        if self.session.rest_journal_capacity == 0 {
            return Err(ConfigError::InvalidValue("session.rest_journal_capacity", "0".into()));
        }
        if self.session.cookie_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "session.cookie_name",
                self.session.cookie_name.clone(),
            ));
        }
        Ok(())
    }

    /// Convert to ServerConfig for the API server.
    pub fn to_server_config(&self) -> Result<ServerConfig, ConfigError> {
        let host: IpAddr = self
            .server
            .host
            .parse()
            .map_err(|_| ConfigError::InvalidHost(self.server.host.clone()))?;

        let mut server_config = ServerConfig::new(host.to_string(), self.server.port)
            .with_sweep_interval_secs(self.session.sweep_interval_secs);

        if !self.server.graceful_shutdown {
            server_config = server_config.without_graceful_shutdown();
        }

        Ok(server_config)
    }

    pub fn to_registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            ttl_ms: self.session.ttl_ms,
            capacity: self.session.capacity,
            rest_journal_capacity: self.session.rest_journal_capacity,
            cookie_name: self.session.cookie_name.clone(),
        }
    }

    pub fn history_budget(&self) -> HistoryBudget {
        HistoryBudget {
            limit: self.history.limit,
            max_bytes: self.history.max_bytes,
        }
    }

    pub fn id_prefixes(&self) -> IdPrefixes {
        IdPrefixes {
            component: self.memo.component_prefix.clone(),
            style: self.memo.style_prefix.clone(),
        }
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// Invalid host address.
    InvalidHost(String),
    /// A setting outside its allowed range.
    InvalidValue(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::InvalidHost(host) => write!(f, "invalid host address: {}", host),
            Self::InvalidValue(name, value) => write!(f, "invalid value for {}: '{}'", name, value),
        }
    }
}

impl std::error::Error for ConfigError {}
