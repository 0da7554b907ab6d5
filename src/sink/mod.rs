//! Output sink capability traits and types.
//!
//! A sink is an output destination for assembled telemetry records
//! (message-bus publish, file append, console). Sinks are discovered from
//! the `[outputs]` configuration namespace, activated once at startup, and
//! receive every record the loop assembles.

pub mod console;
pub mod file;
pub mod mqtt;
pub mod registry;

use thiserror::Error;

use crate::record::TelemetryRecord;

/// Errors that can occur while activating or publishing to a sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Underlying connection failure.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// Sink settings were missing or malformed.
    #[error("settings error: {0}")]
    Settings(String),

    /// Record could not be encoded for the wire.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// The backing service rejected the operation.
    #[error("backend error: {0}")]
    Backend(String),

    /// Publish did not complete within the configured bound.
    #[error("publish timed out")]
    Timeout,
}

/// Sink kind. Only output sinks participate in record fan-out; other
/// kinds are anticipated but unused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    /// Receives every assembled record.
    Output,
}

/// What the configuration declares about one sink, before activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkDescriptor {
    /// Sink name, equal to its `[outputs.<name>]` config key.
    pub name: String,
    /// Sink kind.
    pub kind: SinkKind,
    /// Whether the sink should be activated.
    pub enabled: bool,
}

/// An output destination for telemetry records.
///
/// Implementations must tolerate records of varying shape: field sets
/// differ tick to tick as metrics come and go, and the record instance is
/// never reused after dispatch.
#[async_trait::async_trait]
pub trait Sink: Send + Sync {
    /// Sink name, used for logging and registry bookkeeping.
    fn name(&self) -> &str;

    /// Sink kind.
    fn kind(&self) -> SinkKind {
        SinkKind::Output
    }

    /// Bring up the backing resource (open the connection, create the
    /// file). May be long-running and may fail; a failed sink is skipped,
    /// not fatal.
    async fn activate(&mut self) -> Result<(), SinkError>;

    /// Deliver one record. A failure affects this sink for this tick only.
    async fn publish(&self, record: &TelemetryRecord) -> Result<(), SinkError>;

    /// Release the backing resource.
    async fn close(&self) {}
}
