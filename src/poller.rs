//! The telemetry collection loop.
//!
//! One logical stream of ticks: collect every configured metric and the
//! GPS fix, assemble a record, dispatch it to every active sink, sleep for
//! the cadence. Per-metric and per-sink failures degrade the tick, never
//! abort it, and nothing carries over from one tick to the next. A stop
//! signal is honoured during warm-up and between ticks; on stop the loop
//! closes every sink and source before returning.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::watch;

use crate::config::{DEFAULT_PUBLISH_TIMEOUT, DEFAULT_WARMUP_DELAY};
use crate::record::TelemetryRecord;
use crate::sink::{Sink, SinkError};
use crate::source::gps::GpsFix;
use crate::source::{MetricSource, PositionSource};

/// The collection-and-dispatch loop.
///
/// Exclusively owns the active sink set and the source handles; both are
/// fixed at startup and only released when the loop stops.
pub struct CollectionLoop {
    cadence: Duration,
    warmup: Duration,
    metrics: Vec<String>,
    metadata: BTreeMap<String, String>,
    fault_codes: Vec<String>,
    source: Option<Arc<dyn MetricSource>>,
    position: Option<Arc<dyn PositionSource>>,
    sinks: Vec<Box<dyn Sink>>,
    publish_timeout: Duration,
    started_at: Instant,
}

impl CollectionLoop {
    /// A loop with the given cadence and no sources, sinks or metadata.
    pub fn new(cadence: Duration) -> Self {
        Self {
            cadence,
            warmup: DEFAULT_WARMUP_DELAY,
            metrics: Vec::new(),
            metadata: BTreeMap::new(),
            fault_codes: Vec::new(),
            source: None,
            position: None,
            sinks: Vec::new(),
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
            started_at: Instant::now(),
        }
    }

    /// Set the warm-up delay observed once before the first tick.
    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }

    /// Set the ordered metric identifiers queried each tick.
    pub fn with_metrics(mut self, metrics: Vec<String>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Set the static vehicle metadata merged into every record.
    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set the fault codes captured at startup.
    pub fn with_fault_codes(mut self, codes: Vec<String>) -> Self {
        self.fault_codes = codes;
        self
    }

    /// Set the metric source.
    pub fn with_source(mut self, source: Arc<dyn MetricSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the position source.
    pub fn with_position(mut self, position: Arc<dyn PositionSource>) -> Self {
        self.position = Some(position);
        self
    }

    /// Set the activated sinks, in registration order.
    pub fn with_sinks(mut self, sinks: Vec<Box<dyn Sink>>) -> Self {
        self.sinks = sinks;
        self
    }

    /// Set the bound on a single sink publish.
    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    /// Drive ticks until the stop signal fires.
    ///
    /// The signal is checked during warm-up and while sleeping between
    /// ticks; a tick already collecting or dispatching runs to completion.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        if !self.warmup.is_zero() {
            tracing::info!(delay = ?self.warmup, "Observing hardware warm-up delay");
            tokio::select! {
                _ = tokio::time::sleep(self.warmup) => {}
                _ = shutdown.changed() => {
                    self.close_all().await;
                    return;
                }
            }
        }

        tracing::info!(
            cadence = ?self.cadence,
            metrics = self.metrics.len(),
            sinks = self.sinks.len(),
            "Collection loop started"
        );

        loop {
            let tick_start = Instant::now();
            let record = self.collect().await;
            self.dispatch(&record).await;
            tracing::debug!(
                fields = record.len(),
                elapsed_ms = tick_start.elapsed().as_millis() as u64,
                "Tick complete"
            );

            tokio::select! {
                _ = tokio::time::sleep(self.cadence) => {}
                _ = shutdown.changed() => break,
            }
        }

        self.close_all().await;
        tracing::info!("Collection loop stopped");
    }

    /// Query every metric and the GPS fix, then merge them with metadata,
    /// fault codes and a timestamp into one record.
    ///
    /// Queries are independent; a failed metric is omitted and does not
    /// affect the others.
    async fn collect(&self) -> TelemetryRecord {
        let mut readings = Vec::with_capacity(self.metrics.len());
        if let Some(source) = &self.source {
            for metric in &self.metrics {
                readings.push(source.query(metric).await);
            }
        }

        let fix = match &self.position {
            Some(position) => position.fix().await,
            None => GpsFix::ZERO,
        };

        TelemetryRecord::builder()
            .metadata(&self.metadata)
            .fault_codes(&self.fault_codes)
            .readings(&readings)
            .measurement_time(self.started_at.elapsed().as_secs_f64())
            .timestamp(Utc::now())
            .position(fix)
            .build()
    }

    /// Deliver the record to every sink in registration order. A failed or
    /// timed-out publish is logged and does not affect delivery to the
    /// remaining sinks.
    async fn dispatch(&self, record: &TelemetryRecord) {
        for sink in &self.sinks {
            match self.publish_one(sink.as_ref(), record).await {
                Ok(()) => {
                    tracing::debug!(sink = %sink.name(), "Record published");
                }
                Err(e) => {
                    tracing::warn!(sink = %sink.name(), error = %e, "Publish failed");
                }
            }
        }
    }

    /// Publish to one sink, bounded by the configured publish timeout.
    async fn publish_one(
        &self,
        sink: &dyn Sink,
        record: &TelemetryRecord,
    ) -> Result<(), SinkError> {
        tokio::time::timeout(self.publish_timeout, sink.publish(record))
            .await
            .unwrap_or(Err(SinkError::Timeout))
    }

    /// Release every sink and source.
    async fn close_all(&self) {
        for sink in &self.sinks {
            sink.close().await;
        }
        if let Some(source) = &self.source {
            source.close().await;
        }
        if let Some(position) = &self.position {
            position.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::record::{MetricReading, MetricValue};

    /// Source that succeeds for every metric except a failure set.
    struct PartialSource {
        failing: Vec<&'static str>,
    }

    #[async_trait::async_trait]
    impl MetricSource for PartialSource {
        fn name(&self) -> &str {
            "partial"
        }

        async fn query(&self, metric: &str) -> MetricReading {
            if self.failing.iter().any(|m| *m == metric) {
                MetricReading::unavailable(metric)
            } else {
                MetricReading::ok(metric, MetricValue::Float(42.0))
            }
        }

        async fn fault_codes(&self) -> Vec<String> {
            Vec::new()
        }
    }

    /// Sink capturing every record it receives, optionally failing every
    /// publish.
    struct CaptureSink {
        name: &'static str,
        records: Mutex<Vec<TelemetryRecord>>,
        calls: AtomicUsize,
        fail_always: bool,
    }

    impl CaptureSink {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                records: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
                fail_always: false,
            }
        }

        fn failing(name: &'static str) -> Self {
            Self {
                fail_always: true,
                ..Self::new(name)
            }
        }
    }

    #[async_trait::async_trait]
    impl Sink for Arc<CaptureSink> {
        fn name(&self) -> &str {
            self.name
        }

        async fn activate(&mut self) -> Result<(), SinkError> {
            Ok(())
        }

        async fn publish(&self, record: &TelemetryRecord) -> Result<(), SinkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_always {
                return Err(SinkError::Backend("induced failure".to_string()));
            }
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn loop_with(source: PartialSource, metrics: &[&str]) -> CollectionLoop {
        CollectionLoop::new(Duration::from_secs(5))
            .with_warmup(Duration::ZERO)
            .with_source(Arc::new(source))
            .with_metrics(metrics.iter().map(|m| m.to_string()).collect())
    }

    #[tokio::test]
    async fn test_failing_metric_omitted_others_kept() {
        // Scenario: speed reads 42.0, rpm raises.
        let looper = loop_with(PartialSource { failing: vec!["rpm"] }, &["speed", "rpm"]);
        let record = looper.collect().await;

        assert_eq!(record.get("speed"), Some(&serde_json::Value::from(42.0)));
        assert!(!record.contains("rpm"));
        assert!(record.contains("timestamp"));
    }

    #[tokio::test]
    async fn test_record_contains_exactly_surviving_metrics() {
        let metrics = ["speed", "rpm", "coolant_temp", "engine_load"];
        let looper = loop_with(
            PartialSource {
                failing: vec!["rpm", "engine_load"],
            },
            &metrics,
        );
        let record = looper.collect().await;

        assert!(record.contains("speed"));
        assert!(record.contains("coolant_temp"));
        assert!(!record.contains("rpm"));
        assert!(!record.contains("engine_load"));
    }

    #[tokio::test]
    async fn test_no_position_source_yields_zero_fix() {
        let looper = loop_with(PartialSource { failing: vec![] }, &[]);
        let record = looper.collect().await;

        assert_eq!(record.get("lat"), Some(&serde_json::Value::from(0.0)));
        assert_eq!(record.get("lon"), Some(&serde_json::Value::from(0.0)));
        assert_eq!(record.get("alt"), Some(&serde_json::Value::from(0.0)));
    }

    #[tokio::test]
    async fn test_metadata_and_fault_codes_in_every_tick() {
        let metadata: BTreeMap<String, String> = [
            ("make".to_string(), "Honda".to_string()),
            ("model".to_string(), "".to_string()),
        ]
        .into();
        let looper = loop_with(PartialSource { failing: vec![] }, &["speed"])
            .with_metadata(metadata)
            .with_fault_codes(vec!["P0301".to_string()]);

        for _ in 0..3 {
            let record = looper.collect().await;
            assert_eq!(record.get("make"), Some(&serde_json::Value::from("Honda")));
            assert!(!record.contains("model"));
            assert!(record.contains("fault_codes"));
        }
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_block_others() {
        let failing = Arc::new(CaptureSink::failing("failing"));
        let healthy = Arc::new(CaptureSink::new("healthy"));

        let looper = loop_with(PartialSource { failing: vec![] }, &["speed"]).with_sinks(vec![
            Box::new(Arc::clone(&failing)),
            Box::new(Arc::clone(&healthy)),
        ]);

        for _ in 0..3 {
            let record = looper.collect().await;
            looper.dispatch(&record).await;
        }

        assert_eq!(failing.calls.load(Ordering::SeqCst), 3);
        assert_eq!(failing.records.lock().unwrap().len(), 0);
        assert_eq!(healthy.records.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_sink_bounded_by_publish_timeout() {
        struct StallSink;

        #[async_trait::async_trait]
        impl Sink for StallSink {
            fn name(&self) -> &str {
                "stall"
            }

            async fn activate(&mut self) -> Result<(), SinkError> {
                Ok(())
            }

            async fn publish(&self, _record: &TelemetryRecord) -> Result<(), SinkError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }

        let looper = loop_with(PartialSource { failing: vec![] }, &[])
            .with_publish_timeout(Duration::from_millis(50))
            .with_sinks(vec![Box::new(StallSink)]);

        let record = looper.collect().await;
        assert!(matches!(
            looper.publish_one(&StallSink, &record).await,
            Err(SinkError::Timeout)
        ));
        // Completes despite the sink stalling for an hour.
        looper.dispatch(&record).await;
    }

    #[tokio::test]
    async fn test_measurement_time_is_monotonic() {
        let looper = loop_with(PartialSource { failing: vec![] }, &[]);
        let first = looper.collect().await;
        let second = looper.collect().await;

        let t1 = first.get("measurement_time").unwrap().as_f64().unwrap();
        let t2 = second.get("measurement_time").unwrap().as_f64().unwrap();
        assert!(t1 >= 0.0);
        assert!(t2 >= t1);
    }
}
