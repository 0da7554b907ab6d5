//! Simulated OBD and GPS drivers.
//!
//! Used by the binary when no hardware is attached (`--simulate`) and by
//! tests. They implement the same seams a real adapter would, so swapping
//! in hardware is a wiring change only.

use std::sync::Mutex;

use crate::source::gps::{GpsError, GpsFix, GpsPacket, GpsReceiver};
use crate::source::obd::{ObdError, ObdTransport, ObdValue};

/// Deterministic OBD transport producing a gentle drive cycle.
pub struct SimulatedObd {
    tick: Mutex<u64>,
}

impl SimulatedObd {
    pub fn new() -> Self {
        Self {
            tick: Mutex::new(0),
        }
    }
}

impl Default for SimulatedObd {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ObdTransport for SimulatedObd {
    async fn read(&self, command: &str) -> Result<ObdValue, ObdError> {
        let tick = {
            let mut tick = self.tick.lock().unwrap();
            *tick += 1;
            *tick
        };
        // Slow oscillation so plotted values look like a real drive.
        let phase = (tick as f64 / 10.0).sin();

        let value = match command {
            "SPEED" => ObdValue::Numeric(60.0 + 25.0 * phase),
            "RPM" => ObdValue::Numeric(2100.0 + 700.0 * phase),
            "COOLANT_TEMP" => ObdValue::Numeric(88.0 + 2.0 * phase),
            "ENGINE_LOAD" => ObdValue::Numeric(35.0 + 10.0 * phase),
            "INTAKE_TEMP" => ObdValue::Numeric(24.0 + phase),
            "THROTTLE_POS" => ObdValue::Numeric(18.0 + 6.0 * phase),
            "FUEL_LEVEL" => ObdValue::Numeric(64.0 - tick as f64 * 0.01),
            "FUEL_TYPE" => ObdValue::Text("Gasoline".to_string()),
            "FUEL_STATUS" => {
                ObdValue::Text("Closed loop, using oxygen sensor feedback".to_string())
            }
            other => return Err(ObdError::Unsupported(other.to_string())),
        };
        Ok(value)
    }

    async fn fault_codes(&self) -> Result<Vec<String>, ObdError> {
        Ok(Vec::new())
    }
}

/// GPS receiver emitting satellite chatter with a periodic position packet.
pub struct SimulatedGps {
    packet: Mutex<u64>,
}

impl SimulatedGps {
    pub fn new() -> Self {
        Self {
            packet: Mutex::new(0),
        }
    }
}

impl Default for SimulatedGps {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl GpsReceiver for SimulatedGps {
    async fn next_packet(&self) -> Result<GpsPacket, GpsError> {
        let n = {
            let mut packet = self.packet.lock().unwrap();
            *packet += 1;
            *packet
        };

        // Every third packet carries a position, the rest are status noise.
        if n % 3 == 0 {
            let drift = (n as f64 / 50.0).sin() * 0.001;
            Ok(GpsPacket::Position(GpsFix {
                lat: 51.8986 + drift,
                lon: -8.4756 + drift,
                alt: 18.0,
            }))
        } else if n % 3 == 1 {
            Ok(GpsPacket::Satellite)
        } else {
            Ok(GpsPacket::Device)
        }
    }
}
