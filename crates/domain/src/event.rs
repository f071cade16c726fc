//! Events surfaced to observers of the scan and its sessions.

use serde::Serialize;

use crate::error::SessionError;
use crate::peer::PeerAddress;
use crate::reading::SensorReading;

/// Why the BLE adapter cannot be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterStatus {
    /// The host has no BLE adapter.
    Unavailable,
    /// The adapter exists but its radio is powered off.
    Disabled,
}

/// Non-reading, non-error status changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatusEvent {
    Adapter { adapter: AdapterStatus },
    RssiUpdate { peer: PeerAddress, rssi: i16 },
    Disconnected { peer: PeerAddress },
}

/// Everything an observer can receive, as a single value.
///
/// Used by the in-process event bus and by JSON rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SensorEvent {
    Reading {
        peer: PeerAddress,
        #[serde(flatten)]
        reading: SensorReading,
    },
    Error {
        peer: PeerAddress,
        error: SessionError,
    },
    Status {
        #[serde(flatten)]
        status: StatusEvent,
    },
}
