//! OBD-backed metric source.
//!
//! [`ObdSource`] turns per-metric queries into transport commands and
//! decodes the responses. The transport itself (serial ELM327, bluetooth,
//! replay, ...) lives behind the [`ObdTransport`] seam.

use thiserror::Error;

use crate::record::{MetricReading, MetricValue};
use crate::source::MetricSource;

/// Metrics whose responses decode as text rather than a numeric magnitude.
///
/// This is a static allow-list; everything else is treated as numeric.
pub const TEXT_METRICS: &[&str] = &["fuel_type", "fuel_status", "obd_compliance"];

/// Whether a metric identifier is allow-listed as text-typed.
pub fn is_text_metric(metric: &str) -> bool {
    TEXT_METRICS.iter().any(|m| *m == metric)
}

/// Errors surfaced by an OBD transport.
#[derive(Debug, Error)]
pub enum ObdError {
    /// Underlying I/O failure (adapter unplugged, serial error, ...).
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The vehicle does not support the command.
    #[error("unsupported command: {0}")]
    Unsupported(String),

    /// The response could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

/// A raw value read from the OBD transport.
#[derive(Debug, Clone, PartialEq)]
pub enum ObdValue {
    /// Numeric magnitude.
    Numeric(f64),
    /// Textual response (fuel type classification and friends).
    Text(String),
}

/// Transport seam to the OBD adapter; the hardware driver layer implements
/// this.
#[async_trait::async_trait]
pub trait ObdTransport: Send + Sync {
    /// Execute a named OBD command (e.g. "SPEED") and return its value.
    async fn read(&self, command: &str) -> Result<ObdValue, ObdError>;

    /// Read stored diagnostic trouble codes.
    async fn fault_codes(&self) -> Result<Vec<String>, ObdError>;

    /// Release the adapter connection.
    async fn close(&self) {}
}

/// OBD-backed [`MetricSource`].
pub struct ObdSource<T> {
    transport: T,
}

impl<T: ObdTransport> ObdSource<T> {
    /// Wrap a transport.
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Map a metric identifier to its transport command name.
    ///
    /// Matches the convention of OBD command tables ("speed" -> "SPEED").
    fn command_for(metric: &str) -> String {
        metric.to_uppercase()
    }

    fn decode(metric: &str, value: ObdValue) -> Result<MetricValue, ObdError> {
        match (is_text_metric(metric), value) {
            (true, ObdValue::Text(s)) => Ok(MetricValue::Text(s)),
            (false, ObdValue::Numeric(f)) => Ok(MetricValue::Float(f)),
            (true, ObdValue::Numeric(f)) => Err(ObdError::Decode(format!(
                "expected text response, got numeric {f}"
            ))),
            (false, ObdValue::Text(s)) => Err(ObdError::Decode(format!(
                "expected numeric response, got text '{s}'"
            ))),
        }
    }
}

#[async_trait::async_trait]
impl<T: ObdTransport> MetricSource for ObdSource<T> {
    fn name(&self) -> &str {
        "obd"
    }

    async fn query(&self, metric: &str) -> MetricReading {
        let command = Self::command_for(metric);
        match self.transport.read(&command).await {
            Ok(raw) => match Self::decode(metric, raw) {
                Ok(value) => MetricReading::ok(metric, value),
                Err(e) => {
                    tracing::warn!(metric = %metric, error = %e, "Metric decode failed");
                    MetricReading::unavailable(metric)
                }
            },
            Err(e) => {
                tracing::warn!(metric = %metric, error = %e, "Metric read failed");
                MetricReading::unavailable(metric)
            }
        }
    }

    async fn fault_codes(&self) -> Vec<String> {
        match self.transport.fault_codes().await {
            Ok(codes) => codes,
            Err(e) => {
                tracing::warn!(error = %e, "Fault code read failed");
                Vec::new()
            }
        }
    }

    async fn close(&self) {
        self.transport.close().await;
    }
}
