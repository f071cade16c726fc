//! Notification payload codec.
//!
//! Pure functions operating on raw `&[u8]` slices, with no BLE dependency.
//!
//! | Offset | Field | Type |
//! |--------|-------|------|
//! | 0–3 | Temperature | i32 LE, x0.01 C |
//! | 4–7 | Pressure | i32 LE, x0.01 hPa |
//!
//! Bytes past offset 8 are ignored so longer frames stay readable.

use crate::error::DecodeError;
use crate::reading::SensorReading;

/// Minimum number of bytes a notification must carry.
pub const FRAME_LEN: usize = 8;

const SCALE: f32 = 100.0;

/// Decode a notification payload into a [`SensorReading`].
///
/// # Errors
///
/// Returns [`DecodeError::TooShort`] when fewer than [`FRAME_LEN`] bytes are
/// available.
#[allow(clippy::cast_precision_loss)]
pub fn decode(data: &[u8]) -> Result<SensorReading, DecodeError> {
    if data.len() < FRAME_LEN {
        return Err(DecodeError::TooShort { actual: data.len() });
    }

    let raw_temp = i32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    let raw_pressure = i32::from_le_bytes([data[4], data[5], data[6], data[7]]);

    Ok(SensorReading {
        temperature: raw_temp as f32 / SCALE,
        pressure: raw_pressure as f32 / SCALE,
    })
}

/// Decode a payload that the transport may not have delivered at all.
///
/// An absent payload is treated like an empty one.
///
/// # Errors
///
/// Same as [`decode`].
pub fn decode_optional(data: Option<&[u8]>) -> Result<SensorReading, DecodeError> {
    decode(data.unwrap_or_default())
}

/// Encode a reading into the 8-byte frame sent by the peripheral.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn encode(reading: &SensorReading) -> [u8; FRAME_LEN] {
    // Saturating float-to-int cast: out-of-range values clamp to i32 bounds.
    let raw_temp = (reading.temperature * SCALE).round() as i32;
    let raw_pressure = (reading.pressure * SCALE).round() as i32;

    let mut frame = [0u8; FRAME_LEN];
    frame[0..4].copy_from_slice(&raw_temp.to_le_bytes());
    frame[4..8].copy_from_slice(&raw_pressure.to_le_bytes());
    frame
}
