//! Cartelem - Vehicle Telemetry Library
//!
//! This crate provides the core functionality of the cartelem service: on
//! a fixed cadence it samples vehicle telemetry (OBD metrics, GPS
//! position), assembles one record per tick, and fans the record out to a
//! configurable set of output sinks. It can be used as a library by other
//! Rust projects, or run standalone with the `cartelem` executable.
//!
//! # Architecture
//!
//! - **Sources**: capability traits over the OBD adapter and the GPS
//!   receiver; hardware drivers plug in behind the [`source::obd::ObdTransport`]
//!   and [`source::gps::GpsReceiver`] seams
//! - **Records**: per-tick assembly of metadata, fault codes, readings,
//!   timestamp and position, with omission (never null) for unknowns
//! - **Sinks**: output destinations (MQTT, file, console) discovered from
//!   the `[outputs]` config namespace and activated through a registry
//! - **Loop**: the sequential collect/assemble/dispatch/sleep tick driver
//!   with stop-signal cancellation

pub mod config;
pub mod poller;
pub mod record;
pub mod sink;
pub mod source;

pub use config::{AppConfig, ConfigError};
pub use poller::CollectionLoop;
pub use record::{MetricReading, MetricValue, TelemetryRecord};
pub use sink::registry::SinkRegistry;
pub use sink::{Sink, SinkDescriptor, SinkError, SinkKind};
pub use source::gps::{GpsFix, GpsSource};
pub use source::obd::ObdSource;
pub use source::{MetricSource, PositionSource};
