//! Telemetry record assembly.
//!
//! A [`TelemetryRecord`] is built fresh each tick from vehicle metadata,
//! fault codes, metric readings, a timestamp and a GPS fix, then handed to
//! every active sink and discarded. Unknown values are represented by
//! omission: a record never contains a null field.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::source::gps::GpsFix;

/// Timestamp format used in every record (UTC, second precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// A single metric value as read from a source.
///
/// Most OBD metrics are numeric magnitudes; a small allow-listed subset
/// (e.g. fuel type classification) is textual.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    /// Numeric magnitude (km/h, rpm, °C, ...).
    Float(f64),
    /// Textual classification (e.g. "Diesel").
    Text(String),
}

impl From<MetricValue> for Value {
    fn from(value: MetricValue) -> Self {
        match value {
            MetricValue::Float(f) => Value::from(f),
            MetricValue::Text(s) => Value::from(s),
        }
    }
}

/// Result of querying one metric from a source during a tick.
///
/// A failed read is carried as `value: None` and leads to the metric being
/// omitted from the assembled record, never to a null field.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricReading {
    /// Metric identifier (e.g. "speed", "rpm").
    pub name: String,
    /// The value, or `None` if the read failed.
    pub value: Option<MetricValue>,
}

impl MetricReading {
    /// A successful reading.
    pub fn ok(name: impl Into<String>, value: MetricValue) -> Self {
        Self {
            name: name.into(),
            value: Some(value),
        }
    }

    /// An unavailable reading (read or decode failure).
    pub fn unavailable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    /// Whether the read succeeded.
    pub fn is_available(&self) -> bool {
        self.value.is_some()
    }
}

/// One assembled telemetry record: an insertion-ordered field map.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TelemetryRecord {
    fields: Map<String, Value>,
}

impl TelemetryRecord {
    /// Start building a record.
    pub fn builder() -> RecordBuilder {
        RecordBuilder::default()
    }

    /// Look up a field by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Whether the record contains a field.
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Field names in assembly order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Encode the record as a JSON object string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&Value::Object(self.fields.clone()))
    }
}

/// Builder assembling one record per tick.
///
/// Insertion order is preserved through serialization, so the wire layout
/// is stable: metadata, fault codes, metrics, measurement time, timestamp,
/// position.
#[derive(Debug, Default)]
pub struct RecordBuilder {
    fields: Map<String, Value>,
}

impl RecordBuilder {
    /// Add static vehicle metadata, skipping entries with blank values.
    pub fn metadata(mut self, pairs: &BTreeMap<String, String>) -> Self {
        for (key, value) in pairs {
            if key.trim().is_empty() || value.trim().is_empty() {
                continue;
            }
            self.fields.insert(key.clone(), Value::from(value.clone()));
        }
        self
    }

    /// Add the fault-code block, only if any codes were captured.
    pub fn fault_codes(mut self, codes: &[String]) -> Self {
        if !codes.is_empty() {
            self.fields
                .insert("fault_codes".to_string(), Value::from(codes.to_vec()));
        }
        self
    }

    /// Add one metric reading; unavailable readings are omitted.
    pub fn reading(mut self, reading: &MetricReading) -> Self {
        if let Some(value) = &reading.value {
            self.fields
                .insert(reading.name.clone(), Value::from(value.clone()));
        }
        self
    }

    /// Add all readings in order, omitting unavailable ones.
    pub fn readings<'a>(mut self, readings: impl IntoIterator<Item = &'a MetricReading>) -> Self {
        for reading in readings {
            self = self.reading(reading);
        }
        self
    }

    /// Add seconds elapsed since service start.
    pub fn measurement_time(mut self, seconds: f64) -> Self {
        self.fields
            .insert("measurement_time".to_string(), Value::from(seconds));
        self
    }

    /// Add the record timestamp in the fixed UTC format.
    pub fn timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.fields.insert(
            "timestamp".to_string(),
            Value::from(at.format(TIMESTAMP_FORMAT).to_string()),
        );
        self
    }

    /// Add the GPS position fields.
    pub fn position(mut self, fix: GpsFix) -> Self {
        self.fields.insert("lat".to_string(), Value::from(fix.lat));
        self.fields.insert("lon".to_string(), Value::from(fix.lon));
        self.fields.insert("alt".to_string(), Value::from(fix.alt));
        self
    }

    /// Finish the record.
    pub fn build(self) -> TelemetryRecord {
        TelemetryRecord {
            fields: self.fields,
        }
    }
}
