//! Configuration module.
//!
//! Provides TOML-based configuration loading and validation for:
//! - Vehicle metadata
//! - OBD polling (cadence, metric list, warm-up)
//! - GPS enablement
//! - Output sinks under the `[outputs]` namespace

mod app;
mod validation;

pub use app::{
    AppConfig, GpsConfig, ObdConfig, OutputEntry, OutputsConfig, DEFAULT_METRICS,
    DEFAULT_POLL_INTERVAL_SECS, DEFAULT_PUBLISH_TIMEOUT, DEFAULT_WARMUP_DELAY,
};
pub use validation::{expand_env_vars, ConfigError};
