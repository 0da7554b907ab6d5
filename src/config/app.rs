//! Application configuration structures.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use super::validation::{expand_env_vars, ConfigError};

// =============================================================================
// Constants
// =============================================================================

/// Default polling cadence in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Default hardware warm-up delay before the first tick.
pub const DEFAULT_WARMUP_DELAY: Duration = Duration::from_secs(5);

/// Default bound on a single sink publish.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Metrics polled when the config does not name any.
pub const DEFAULT_METRICS: &[&str] = &[
    "speed",
    "rpm",
    "coolant_temp",
    "engine_load",
    "intake_temp",
];

fn default_enabled() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_warmup_delay() -> Duration {
    DEFAULT_WARMUP_DELAY
}

fn default_publish_timeout() -> Duration {
    DEFAULT_PUBLISH_TIMEOUT
}

fn default_metrics() -> Vec<String> {
    DEFAULT_METRICS.iter().map(|m| m.to_string()).collect()
}

// =============================================================================
// OBD Configuration
// =============================================================================

/// OBD polling configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObdConfig {
    /// Query the OBD adapter at all (default: true).
    pub enabled: bool,

    /// Polling cadence in whole seconds (default: 5). Fixed for the
    /// process lifetime.
    pub poll_interval: u64,

    /// Hardware warm-up delay observed once before the first tick
    /// (default: 5s).
    #[serde(with = "humantime_serde")]
    pub warmup_delay: Duration,

    /// Ordered list of metric identifiers polled each tick.
    pub metrics: Vec<String>,
}

impl Default for ObdConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: default_poll_interval(),
            warmup_delay: default_warmup_delay(),
            metrics: default_metrics(),
        }
    }
}

impl ObdConfig {
    /// The cadence as a duration.
    pub fn cadence(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }
}

// =============================================================================
// GPS Configuration
// =============================================================================

/// GPS configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct GpsConfig {
    /// Resolve a position fix each tick (default: false).
    pub enabled: bool,

    /// Device path for a hardware receiver driver. The built-in simulated
    /// receiver ignores it.
    pub device: Option<String>,
}

// =============================================================================
// Output Configuration
// =============================================================================

/// One `[outputs.<name>]` entry: an enablement flag plus sink-specific
/// settings passed through to the sink constructor untouched.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputEntry {
    /// Activate this sink (default: true).
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Sink-specific settings, interpreted by the sink itself.
    #[serde(flatten)]
    pub settings: toml::Table,
}

/// The `[outputs]` namespace.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputsConfig {
    /// Bound on a single sink publish per tick (default: 5s).
    #[serde(default = "default_publish_timeout", with = "humantime_serde")]
    pub publish_timeout: Duration,

    /// Configured sinks, keyed by name.
    #[serde(flatten)]
    pub sinks: BTreeMap<String, OutputEntry>,
}

impl Default for OutputsConfig {
    fn default() -> Self {
        Self {
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
            sinks: BTreeMap::new(),
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration, read once at startup.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    /// Static vehicle metadata merged into every record. Blank values are
    /// omitted from records.
    #[serde(default)]
    pub vehicle: BTreeMap<String, String>,

    /// OBD polling settings.
    #[serde(default)]
    pub obd: ObdConfig,

    /// GPS settings.
    #[serde(default)]
    pub gps: GpsConfig,

    /// Output sink namespace.
    #[serde(default)]
    pub outputs: OutputsConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables referenced as `${VAR}` or `${VAR:-default}`
    /// are expanded before parsing.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or
    /// validated. Any of these is fatal at startup.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(content);
        let config: Self = toml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.obd.poll_interval == 0 {
            return Err(ConfigError::ValidationError(
                "obd poll_interval must be a positive number of seconds".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for metric in &self.obd.metrics {
            if metric.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "metric name cannot be empty".to_string(),
                ));
            }
            if !seen.insert(metric.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate metric: '{}'",
                    metric
                )));
            }
        }

        for name in self.outputs.sinks.keys() {
            if name.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "output sink name cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}
