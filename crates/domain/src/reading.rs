//! Sensor reading — the decoded content of one notification.

use serde::{Deserialize, Serialize};

/// Temperature and pressure sampled by the peripheral.
///
/// Produced once per successfully decoded notification; carries no identity
/// beyond its values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Temperature in degrees Celsius.
    pub temperature: f32,
    /// Barometric pressure in hectopascals.
    pub pressure: f32,
}

impl SensorReading {
    #[must_use]
    pub fn new(temperature: f32, pressure: f32) -> Self {
        Self {
            temperature,
            pressure,
        }
    }
}

impl std::fmt::Display for SensorReading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2} C, {:.2} hPa", self.temperature, self.pressure)
    }
}
