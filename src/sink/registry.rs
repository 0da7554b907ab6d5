//! Sink registry: discovery and activation of configured output sinks.
//!
//! Discovery maps the `[outputs]` configuration namespace onto sink
//! descriptors; activation instantiates and brings up each enabled sink
//! through a name -> constructor table. Per-sink failures are logged and
//! skipped, never fatal: an empty activated set is a valid outcome (the
//! loop still runs, just with no output).

use std::collections::BTreeMap;

use crate::config::OutputsConfig;
use crate::sink::console::ConsoleSink;
use crate::sink::file::FileSink;
use crate::sink::mqtt::MqttSink;
use crate::sink::{Sink, SinkDescriptor, SinkError, SinkKind};

/// Constructs an unactivated sink from its `[outputs.<name>]` settings.
pub type SinkBuilder =
    Box<dyn Fn(&toml::Table) -> Result<Box<dyn Sink>, SinkError> + Send + Sync>;

/// Registry mapping sink names to constructors.
///
/// No runtime reflection: every sink the service can output to is either
/// registered here at build time or added through [`register`].
///
/// [`register`]: SinkRegistry::register
pub struct SinkRegistry {
    builders: BTreeMap<String, SinkBuilder>,
}

impl SinkRegistry {
    /// Registry with no builders; useful in tests.
    pub fn empty() -> Self {
        Self {
            builders: BTreeMap::new(),
        }
    }

    /// Registry with the built-in sinks: `mqtt`, `file`, `console`.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("mqtt", |settings| {
            Ok(Box::new(MqttSink::from_settings(settings)?) as Box<dyn Sink>)
        });
        registry.register("file", |settings| {
            Ok(Box::new(FileSink::from_settings(settings)?) as Box<dyn Sink>)
        });
        registry.register("console", |settings| {
            Ok(Box::new(ConsoleSink::from_settings(settings)?) as Box<dyn Sink>)
        });
        registry
    }

    /// Register a sink constructor under a name.
    pub fn register<F>(&mut self, name: impl Into<String>, builder: F)
    where
        F: Fn(&toml::Table) -> Result<Box<dyn Sink>, SinkError> + Send + Sync + 'static,
    {
        self.builders.insert(name.into(), Box::new(builder));
    }

    /// Whether a constructor is registered under this name.
    pub fn knows(&self, name: &str) -> bool {
        self.builders.contains_key(name)
    }

    /// Derive sink descriptors from the configured `[outputs]` entries.
    pub fn discover(&self, outputs: &OutputsConfig) -> Vec<SinkDescriptor> {
        outputs
            .sinks
            .iter()
            .map(|(name, entry)| SinkDescriptor {
                name: name.clone(),
                kind: SinkKind::Output,
                enabled: entry.enabled,
            })
            .collect()
    }

    /// Instantiate and activate every enabled configured sink.
    ///
    /// Policy per sink: disabled -> never instantiated; no registered
    /// constructor -> logged, skipped; malformed settings -> logged,
    /// skipped; activation failure -> logged, skipped. Returns the set of
    /// sinks that activated successfully, in name order.
    pub async fn activate_all(&self, outputs: &OutputsConfig) -> Vec<Box<dyn Sink>> {
        let mut active: Vec<Box<dyn Sink>> = Vec::new();

        for descriptor in self.discover(outputs) {
            if !descriptor.enabled {
                tracing::debug!(sink = %descriptor.name, "Sink disabled, skipping");
                continue;
            }

            let Some(builder) = self.builders.get(&descriptor.name) else {
                tracing::warn!(sink = %descriptor.name, "No implementation for configured sink, skipping");
                continue;
            };

            let settings = &outputs.sinks[&descriptor.name].settings;
            let mut sink = match builder(settings) {
                Ok(sink) => sink,
                Err(e) => {
                    tracing::warn!(sink = %descriptor.name, error = %e, "Sink settings rejected, skipping");
                    continue;
                }
            };

            match sink.activate().await {
                Ok(()) => {
                    tracing::info!(sink = %descriptor.name, "Sink activated");
                    active.push(sink);
                }
                Err(e) => {
                    tracing::warn!(sink = %descriptor.name, error = %e, "Sink activation failed, skipping");
                }
            }
        }

        if active.is_empty() {
            tracing::warn!("No output sinks activated; records will be collected but not delivered");
        }

        active
    }
}

impl std::fmt::Debug for SinkRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkRegistry")
            .field("builders", &self.builders.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::config::AppConfig;
    use crate::record::TelemetryRecord;

    struct NullSink {
        activations: Arc<AtomicUsize>,
        fail_activation: bool,
    }

    #[async_trait::async_trait]
    impl Sink for NullSink {
        fn name(&self) -> &str {
            "null"
        }

        async fn activate(&mut self) -> Result<(), SinkError> {
            self.activations.fetch_add(1, Ordering::SeqCst);
            if self.fail_activation {
                Err(SinkError::Backend("broker unreachable".to_string()))
            } else {
                Ok(())
            }
        }

        async fn publish(&self, _record: &TelemetryRecord) -> Result<(), SinkError> {
            Ok(())
        }
    }

    fn outputs(toml: &str) -> OutputsConfig {
        AppConfig::from_toml(toml).unwrap().outputs
    }

    fn null_registry(activations: Arc<AtomicUsize>, fail: bool) -> SinkRegistry {
        let mut registry = SinkRegistry::empty();
        registry.register("null", move |_| {
            Ok(Box::new(NullSink {
                activations: Arc::clone(&activations),
                fail_activation: fail,
            }) as Box<dyn Sink>)
        });
        registry
    }

    #[test]
    fn test_discover_reads_enabled_flags() {
        let registry = SinkRegistry::empty();
        let outputs = outputs("[outputs.null]\nenabled = false\n[outputs.other]\n");

        let descriptors = registry.discover(&outputs);
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].name, "null");
        assert!(!descriptors[0].enabled);
        assert_eq!(descriptors[0].kind, SinkKind::Output);
        assert!(descriptors[1].enabled);
    }

    #[tokio::test]
    async fn test_disabled_sink_never_instantiated() {
        let activations = Arc::new(AtomicUsize::new(0));
        let registry = null_registry(Arc::clone(&activations), false);

        let active = registry
            .activate_all(&outputs("[outputs.null]\nenabled = false\n"))
            .await;

        assert!(active.is_empty());
        assert_eq!(activations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_sink_skipped() {
        let registry = SinkRegistry::empty();
        let active = registry.activate_all(&outputs("[outputs.mystery]\n")).await;
        assert!(active.is_empty());
    }

    #[tokio::test]
    async fn test_activation_failure_skipped() {
        let activations = Arc::new(AtomicUsize::new(0));
        let registry = null_registry(Arc::clone(&activations), true);

        let active = registry.activate_all(&outputs("[outputs.null]\n")).await;

        assert!(active.is_empty());
        assert_eq!(activations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_successful_activation() {
        let activations = Arc::new(AtomicUsize::new(0));
        let registry = null_registry(Arc::clone(&activations), false);

        let active = registry.activate_all(&outputs("[outputs.null]\n")).await;

        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name(), "null");
    }

    #[tokio::test]
    async fn test_malformed_settings_skipped() {
        let mut registry = SinkRegistry::empty();
        registry.register("strict", |settings| {
            settings
                .get("required_key")
                .ok_or_else(|| SinkError::Settings("missing required_key".to_string()))?;
            unreachable!("settings never contain required_key in this test")
        });

        let active = registry.activate_all(&outputs("[outputs.strict]\n")).await;
        assert!(active.is_empty());
    }

    #[test]
    fn test_builtin_registry_knows_builtins() {
        let registry = SinkRegistry::builtin();
        assert!(registry.knows("mqtt"));
        assert!(registry.knows("file"));
        assert!(registry.knows("console"));
        assert!(!registry.knows("mystery"));
    }
}
