//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables
//! - CLI arguments

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShieldError};

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Input validator configuration
    #[serde(default)]
    pub validator: ValidatorConfig,

    /// Output escaper configuration
    #[serde(default)]
    pub escaper: EscaperConfig,

    /// Middleware policy configuration
    #[serde(default)]
    pub middleware: MiddlewareConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ShieldError::Config(format!("Failed to read config file: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| ShieldError::Config(format!("Failed to parse config: {e}")))
    }

    /// Default config file location (`<config dir>/umlshield/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("umlshield").join("config.toml"))
    }

    /// Load the default file if present, otherwise defaults
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(path),
            _ => Ok(Self::default()),
        }
    }

    /// Apply environment variable overrides
    pub fn with_env(mut self) -> Self {
        if let Some(val) = env_bool("UMLSHIELD_STRICT_MODE") {
            self.middleware.strict_mode = val;
        }
        if let Some(val) = env_bool("UMLSHIELD_QUARANTINE_MODE") {
            self.middleware.quarantine_mode = val;
        }
        if let Some(val) = env_parse("UMLSHIELD_MAX_THREAT_SCORE") {
            self.middleware.max_threat_score = val;
        }
        if let Some(val) = env_parse("UMLSHIELD_ALERT_THRESHOLD") {
            self.middleware.alert_threshold = val;
        }
        if let Some(val) = env_parse("UMLSHIELD_MAX_LOG_ENTRIES") {
            self.middleware.max_log_entries = val;
        }
        if let Some(val) = env_parse("UMLSHIELD_MAX_LENGTH") {
            self.validator.max_length = val;
        }
        self
    }

    /// Defaults with environment variable overrides
    pub fn from_env() -> Self {
        Self::default().with_env()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .and_then(|v| match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}

/// Input validator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Maximum input length in characters
    pub max_length: usize,

    /// Maximum actor name length
    pub max_actor_length: usize,

    /// Maximum action text length
    pub max_action_length: usize,

    /// Tags the HTML sanitizer keeps
    pub allowed_tags: Vec<String>,

    /// Additional regexes reported as dangerous
    pub blocked_patterns: Vec<String>,

    /// Debounce interval for realtime validation (ms)
    pub debounce_ms: u64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_length: 10_000,
            max_actor_length: 50,
            max_action_length: 200,
            allowed_tags: ["b", "i", "em", "strong", "u", "br"]
                .iter()
                .map(|t| (*t).to_string())
                .collect(),
            blocked_patterns: Vec::new(),
            debounce_ms: 300,
        }
    }
}

impl ValidatorConfig {
    /// Debounce interval
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Output escaper configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EscaperConfig {
    /// Use advanced HTML escaping by default
    pub advanced: bool,

    /// Pre-sanitize HTML output with the tag stripper
    pub strip_tags: bool,
}

/// Middleware policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MiddlewareConfig {
    /// Reject anything that is not `safe`
    pub strict_mode: bool,

    /// Withhold output at or above `max_threat_score`
    pub quarantine_mode: bool,

    /// Quarantine threshold (0-100)
    pub max_threat_score: u32,

    /// Incident threshold (0-100)
    pub alert_threshold: u32,

    /// Capacity of each log list
    pub max_log_entries: usize,

    /// Soft processing budget (ms); exceeding it only logs a warning
    pub max_processing_time_ms: u64,

    /// Maximum input size in bytes accepted by the pipeline
    pub max_input_size: usize,

    /// Record timing samples
    pub performance_logging: bool,

    /// Record threat log entries
    pub threat_logging: bool,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            strict_mode: false,
            quarantine_mode: false,
            max_threat_score: 80,
            alert_threshold: 60,
            max_log_entries: 1000,
            max_processing_time_ms: 100,
            max_input_size: 1024 * 1024, // 1MB
            performance_logging: true,
            threat_logging: true,
        }
    }
}

impl MiddlewareConfig {
    /// Soft processing budget
    pub fn max_processing_time(&self) -> Duration {
        Duration::from_millis(self.max_processing_time_ms)
    }
}
