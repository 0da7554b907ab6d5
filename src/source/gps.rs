//! GPS position source with bounded fix retry.
//!
//! The receiver (gpsd socket, serial NMEA reader, ...) sits behind the
//! [`GpsReceiver`] seam and emits a stream of packets, only some of which
//! carry a position. [`GpsSource::fix`] consumes at most
//! [`MAX_FIX_ATTEMPTS`] packets before giving up and returning the zero
//! fix, so a quiet antenna never stalls a tick.

use serde::Serialize;
use thiserror::Error;

use crate::source::PositionSource;

/// Maximum packet receipts consumed per fix attempt.
pub const MAX_FIX_ATTEMPTS: u32 = 20;

/// A resolved position reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GpsFix {
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lon: f64,
    /// Altitude in metres.
    pub alt: f64,
}

impl GpsFix {
    /// The fix reported when GPS is disabled or unresolved.
    pub const ZERO: GpsFix = GpsFix {
        lat: 0.0,
        lon: 0.0,
        alt: 0.0,
    };
}

/// Errors surfaced by a GPS receiver.
#[derive(Debug, Error)]
pub enum GpsError {
    /// Underlying I/O failure.
    #[error("receiver error: {0}")]
    Receiver(#[from] std::io::Error),

    /// The packet could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

/// One packet received from the GPS device.
///
/// Only `Position` packets resolve a fix; every other kind just consumes
/// retry budget.
#[derive(Debug, Clone, PartialEq)]
pub enum GpsPacket {
    /// A position-fix report.
    Position(GpsFix),
    /// Device status report.
    Device,
    /// Satellite visibility report.
    Satellite,
    /// Any other packet kind.
    Other,
}

/// Receiver seam to the GPS device; the hardware driver layer implements
/// this.
#[async_trait::async_trait]
pub trait GpsReceiver: Send + Sync {
    /// Receive the next packet from the device.
    async fn next_packet(&self) -> Result<GpsPacket, GpsError>;

    /// Release the device connection.
    async fn close(&self) {}
}

/// GPS-backed [`PositionSource`].
pub struct GpsSource<R> {
    receiver: R,
}

impl<R: GpsReceiver> GpsSource<R> {
    /// Wrap a receiver.
    pub fn new(receiver: R) -> Self {
        Self { receiver }
    }
}

#[async_trait::async_trait]
impl<R: GpsReceiver> PositionSource for GpsSource<R> {
    fn name(&self) -> &str {
        "gps"
    }

    async fn fix(&self) -> GpsFix {
        for attempt in 1..=MAX_FIX_ATTEMPTS {
            match self.receiver.next_packet().await {
                Ok(GpsPacket::Position(fix)) => {
                    tracing::debug!(
                        lat = fix.lat,
                        lon = fix.lon,
                        alt = fix.alt,
                        "GPS fix resolved"
                    );
                    return fix;
                }
                Ok(_) => {
                    tracing::trace!(attempt, "Non-position GPS packet");
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "GPS packet receive failed");
                }
            }
        }

        tracing::warn!(
            attempts = MAX_FIX_ATTEMPTS,
            "No GPS fix within retry budget, reporting zero fix"
        );
        GpsFix::ZERO
    }

    async fn close(&self) {
        self.receiver.close().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Receiver replaying a scripted packet sequence, then `Other` forever.
    struct ScriptedReceiver {
        packets: Mutex<Vec<Result<GpsPacket, GpsError>>>,
        receipts: Mutex<u32>,
    }

    impl ScriptedReceiver {
        fn new(packets: Vec<Result<GpsPacket, GpsError>>) -> Self {
            Self {
                packets: Mutex::new(packets),
                receipts: Mutex::new(0),
            }
        }

        fn receipts(&self) -> u32 {
            *self.receipts.lock().unwrap()
        }
    }

    #[async_trait::async_trait]
    impl GpsReceiver for ScriptedReceiver {
        async fn next_packet(&self) -> Result<GpsPacket, GpsError> {
            *self.receipts.lock().unwrap() += 1;
            let mut packets = self.packets.lock().unwrap();
            if packets.is_empty() {
                Ok(GpsPacket::Other)
            } else {
                packets.remove(0)
            }
        }
    }

    fn fix(lat: f64, lon: f64, alt: f64) -> GpsFix {
        GpsFix { lat, lon, alt }
    }

    #[tokio::test]
    async fn test_position_packet_resolves_fix() {
        let source = GpsSource::new(ScriptedReceiver::new(vec![
            Ok(GpsPacket::Device),
            Ok(GpsPacket::Satellite),
            Ok(GpsPacket::Position(fix(51.9, -8.5, 12.0))),
        ]));

        assert_eq!(source.fix().await, fix(51.9, -8.5, 12.0));
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted_yields_zero_fix() {
        let source = GpsSource::new(ScriptedReceiver::new(vec![]));

        assert_eq!(source.fix().await, GpsFix::ZERO);
    }

    #[tokio::test]
    async fn test_at_most_twenty_receipts() {
        let source = GpsSource::new(ScriptedReceiver::new(vec![]));
        let _ = source.fix().await;
        assert_eq!(source.receiver.receipts(), MAX_FIX_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_receive_errors_consume_budget() {
        let mut packets: Vec<Result<GpsPacket, GpsError>> = (0..5)
            .map(|_| Err(GpsError::Decode("bad sentence".to_string())))
            .collect();
        packets.push(Ok(GpsPacket::Position(fix(1.0, 2.0, 3.0))));

        let source = GpsSource::new(ScriptedReceiver::new(packets));
        assert_eq!(source.fix().await, fix(1.0, 2.0, 3.0));
        assert_eq!(source.receiver.receipts(), 6);
    }

    #[tokio::test]
    async fn test_fix_on_twentieth_packet_succeeds() {
        let mut packets: Vec<Result<GpsPacket, GpsError>> =
            (0..19).map(|_| Ok(GpsPacket::Satellite)).collect();
        packets.push(Ok(GpsPacket::Position(fix(4.0, 5.0, 6.0))));

        let source = GpsSource::new(ScriptedReceiver::new(packets));
        assert_eq!(source.fix().await, fix(4.0, 5.0, 6.0));
    }
}
