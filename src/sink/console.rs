//! Console output sink.
//!
//! Emits each record through `tracing`, which is enough for a dashboard
//! tail or a UI process scraping the log stream.

use serde::Deserialize;

use crate::record::TelemetryRecord;
use crate::sink::{Sink, SinkError};

/// Settings for the console sink, from `[outputs.console]`.
///
/// There are none today; the struct exists so unknown keys are tolerated
/// the same way as for other sinks.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConsoleConfig {}

/// `tracing`-backed [`Sink`].
#[derive(Debug, Default)]
pub struct ConsoleSink {
    _config: ConsoleConfig,
}

impl ConsoleSink {
    /// Build a sink from its `[outputs.console]` settings table.
    pub fn from_settings(settings: &toml::Table) -> Result<Self, SinkError> {
        let config: ConsoleConfig = settings
            .clone()
            .try_into()
            .map_err(|e| SinkError::Settings(e.to_string()))?;
        Ok(Self { _config: config })
    }
}

#[async_trait::async_trait]
impl Sink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    async fn activate(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    async fn publish(&self, record: &TelemetryRecord) -> Result<(), SinkError> {
        let payload = record.to_json()?;
        tracing::info!(target: "cartelem::telemetry", %payload, "Telemetry record");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{MetricReading, MetricValue};

    #[tokio::test]
    async fn test_console_sink_accepts_records() {
        let mut sink = ConsoleSink::from_settings(&toml::Table::new()).unwrap();
        sink.activate().await.unwrap();

        let record = TelemetryRecord::builder()
            .reading(&MetricReading::ok("speed", MetricValue::Float(42.0)))
            .build();
        assert!(sink.publish(&record).await.is_ok());
    }
}
