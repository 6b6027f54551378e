//! Telemetry configuration and management

use crate::{sanitization::DEFAULT_REDACTED_FIELDS, Error, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;

/// Main telemetry configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Local diagnostic output (never shipped to a collector)
    pub diagnostics: DiagnosticsConfig,

    /// Log collector settings
    pub logging: LogCollectorConfig,

    /// Metric collector and aggregation settings
    pub metrics: MetricsConfig,

    /// Privacy and redaction settings
    pub privacy: PrivacyConfig,

    /// Outbound HTTP settings shared by both collectors
    pub transport: TransportConfig,
}

/// Local diagnostics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: LogLevel,

    /// Output format (JSON, Pretty, Compact)
    pub format: LogFormat,

    /// Include source location in logs
    pub include_location: bool,
}

/// Log collector configuration. Missing `url` or `api_key` disables log shipping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogCollectorConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub user_id: Option<String>,
    /// Value of the `component` stream label
    pub source: String,
}

/// Metrics configuration. Missing `url` or `api_key` disables metric shipping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
    /// Value of the `source` attribute on every data point
    pub source: String,

    /// Flush period (in seconds)
    pub flush_interval_seconds: u64,

    /// Most-recent latency samples kept per window
    pub latency_capacity: usize,

    /// Window length above which a flush trims the window
    pub trim_threshold: usize,

    /// Samples kept after a trim
    pub trim_keep: usize,
}

/// Privacy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivacyConfig {
    /// Key fragments that trigger redaction
    pub redacted_fields: Vec<String>,

    /// Maximum request/response bytes captured per request for logging
    pub max_capture_bytes: usize,
}

/// Collector HTTP transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Per-push request timeout (in seconds)
    pub timeout_seconds: u64,
}

/// Log level configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl LogLevel {
    /// Parse a case-insensitive level name
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_uppercase().as_str() {
            "TRACE" => Some(LogLevel::Trace),
            "DEBUG" => Some(LogLevel::Debug),
            "INFO" => Some(LogLevel::Info),
            "WARN" => Some(LogLevel::Warn),
            "ERROR" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogFormat {
    /// Structured JSON format
    Json,
    /// Human-readable pretty format
    Pretty,
    /// Compact single-line format
    Compact,
}

impl LogFormat {
    /// Parse a case-insensitive format name
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "json" => Some(LogFormat::Json),
            "pretty" => Some(LogFormat::Pretty),
            "compact" => Some(LogFormat::Compact),
            _ => None,
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            include_location: false,
        }
    }
}

impl Default for LogCollectorConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            user_id: None,
            source: "jwt-pizza-service".to_string(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            source: "jwt-pizza-service".to_string(),
            flush_interval_seconds: 10,
            latency_capacity: 1000,
            trim_threshold: 100,
            trim_keep: 50,
        }
    }
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            redacted_fields: DEFAULT_REDACTED_FIELDS
                .iter()
                .map(|field| field.to_string())
                .collect(),
            max_capture_bytes: 64 * 1024,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self { timeout_seconds: 10 }
    }
}

impl MetricsConfig {
    /// Flush period as a `Duration`
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_seconds)
    }
}

impl TransportConfig {
    /// Request timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl TelemetryConfig {
    /// Load configuration from file or create default, then apply env overrides
    pub async fn load(config_path: Option<&Path>) -> Result<Self> {
        let config_file = match config_path {
            Some(path) => path.to_path_buf(),
            None => Self::default_config_path()?,
        };

        let mut config = if config_file.exists() {
            let content = tokio::fs::read_to_string(&config_file).await?;
            toml::from_str(&content).map_err(|e| Error::Config {
                message: format!("Failed to parse telemetry config: {}", e),
            })?
        } else {
            Self::default()
        };

        config.load_env_overrides();
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, config_path: Option<&Path>) -> Result<()> {
        let config_file = match config_path {
            Some(path) => path.to_path_buf(),
            None => Self::default_config_path()?,
        };

        if let Some(parent) = config_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| Error::Config {
            message: format!("Failed to serialize telemetry config: {}", e),
        })?;

        tokio::fs::write(&config_file, content).await?;
        Ok(())
    }

    /// Load environment variable overrides
    pub fn load_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Log collector
        if let Some(url) = lookup("PIZZA_LOGGING_URL") {
            self.logging.url = Some(url);
        }
        if let Some(key) = lookup("PIZZA_LOGGING_API_KEY") {
            self.logging.api_key = Some(key);
        }
        if let Some(user_id) = lookup("PIZZA_LOGGING_USER_ID") {
            self.logging.user_id = Some(user_id);
        }
        if let Some(source) = lookup("PIZZA_LOGGING_SOURCE") {
            self.logging.source = source;
        }

        // Metric collector
        if let Some(url) = lookup("PIZZA_METRICS_URL") {
            self.metrics.url = Some(url);
        }
        if let Some(key) = lookup("PIZZA_METRICS_API_KEY") {
            self.metrics.api_key = Some(key);
        }
        if let Some(source) = lookup("PIZZA_METRICS_SOURCE") {
            self.metrics.source = source;
        }
        if let Some(interval) = lookup("PIZZA_METRICS_INTERVAL_SECONDS") {
            self.metrics.flush_interval_seconds = interval
                .parse()
                .unwrap_or(self.metrics.flush_interval_seconds);
        }

        // Diagnostics
        if let Some(level) = lookup("PIZZA_LOG_LEVEL") {
            self.diagnostics.level = LogLevel::parse(&level).unwrap_or(self.diagnostics.level);
        }
        if let Some(format) = lookup("PIZZA_LOG_FORMAT") {
            self.diagnostics.format =
                LogFormat::parse(&format).unwrap_or(self.diagnostics.format);
        }
    }

    /// Get default configuration file path
    fn default_config_path() -> Result<PathBuf> {
        let project_dirs =
            ProjectDirs::from("com", "jwt-pizza", "pizza-telemetry").ok_or_else(|| {
                Error::Config {
                    message: "Could not determine config directory".to_string(),
                }
            })?;

        Ok(project_dirs.config_dir().join("telemetry.toml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.metrics.flush_interval_seconds == 0 {
            return Err(Error::Config {
                message: "metrics.flush_interval_seconds must be greater than 0".to_string(),
            });
        }

        if self.metrics.latency_capacity == 0 {
            return Err(Error::Config {
                message: "metrics.latency_capacity must be greater than 0".to_string(),
            });
        }

        if self.metrics.trim_keep > self.metrics.trim_threshold {
            return Err(Error::Config {
                message: format!(
                    "metrics.trim_keep ({}) must not exceed metrics.trim_threshold ({})",
                    self.metrics.trim_keep, self.metrics.trim_threshold
                ),
            });
        }

        if self.metrics.trim_threshold > self.metrics.latency_capacity {
            return Err(Error::Config {
                message: format!(
                    "metrics.trim_threshold ({}) must not exceed metrics.latency_capacity ({})",
                    self.metrics.trim_threshold, self.metrics.latency_capacity
                ),
            });
        }

        if self.privacy.redacted_fields.is_empty() {
            return Err(Error::Config {
                message: "privacy.redacted_fields must not be empty".to_string(),
            });
        }

        for (name, url) in [
            ("logging.url", &self.logging.url),
            ("metrics.url", &self.metrics.url),
        ] {
            if let Some(url) = url {
                reqwest::Url::parse(url).map_err(|e| Error::Config {
                    message: format!("Invalid {} '{}': {}", name, url, e),
                })?;
            }
        }

        Ok(())
    }
}
