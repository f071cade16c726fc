//! Simulated BMP280 — a slowly drifting temperature/pressure source.

use envsensor_domain::payload;
use envsensor_domain::reading::SensorReading;

const BASE_TEMPERATURE: f32 = 24.0;
const TEMPERATURE_SWING: f32 = 1.5;
const BASE_PRESSURE: f32 = 1013.25;
const PRESSURE_SWING: f32 = 2.5;
const PHASE_STEP: f32 = 0.05;

/// Deterministic drift: every sample advances one phase step.
#[derive(Debug, Default)]
pub(crate) struct SimulatedBmp280 {
    phase: f32,
}

impl SimulatedBmp280 {
    pub(crate) fn sample(&mut self) -> SensorReading {
        let temperature = BASE_TEMPERATURE + TEMPERATURE_SWING * self.phase.sin();
        let pressure = BASE_PRESSURE + PRESSURE_SWING * self.phase.cos();
        self.phase = (self.phase + PHASE_STEP) % std::f32::consts::TAU;
        SensorReading::new(hundredths(temperature), hundredths(pressure))
    }
}

fn hundredths(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}

/// Notification value for `reading`.
///
/// The legacy frame is what the original firmware sent: the low 16 bits of
/// each ×100 value, little-endian, four bytes in total.
pub(crate) fn frame(reading: &SensorReading, legacy: bool) -> Vec<u8> {
    let full = payload::encode(reading);
    if legacy {
        vec![full[0], full[1], full[4], full[5]]
    } else {
        full.to_vec()
    }
}
