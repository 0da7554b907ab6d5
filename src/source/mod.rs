//! Metric source capability traits.
//!
//! Sources never let an I/O or decode failure escape past their boundary:
//! a failed read is a valid observation and comes back as an unavailable
//! [`MetricReading`], logged at warn. The caller proceeds to the next
//! metric rather than aborting the tick.

pub mod gps;
pub mod obd;
pub mod sim;

use crate::record::MetricReading;
use crate::source::gps::GpsFix;

/// Capability yielding a single metric's current value on demand.
///
/// The hardware driver layer supplies the transport underneath; the
/// collection loop depends only on this contract.
#[async_trait::async_trait]
pub trait MetricSource: Send + Sync {
    /// Source name, used for logging.
    fn name(&self) -> &str;

    /// Read one metric. Failures are reported as unavailable, never raised.
    async fn query(&self, metric: &str) -> MetricReading;

    /// Read stored fault codes. Called once at startup; failures yield an
    /// empty set.
    async fn fault_codes(&self) -> Vec<String>;

    /// Release underlying resources.
    async fn close(&self) {}
}

/// Capability resolving a GPS position fix.
#[async_trait::async_trait]
pub trait PositionSource: Send + Sync {
    /// Source name, used for logging.
    fn name(&self) -> &str;

    /// Resolve a fix, falling back to [`GpsFix::ZERO`] when none can be
    /// obtained within the retry budget.
    async fn fix(&self) -> GpsFix;

    /// Release underlying resources.
    async fn close(&self) {}
}
