//! BLE adapter configuration.

use serde::Deserialize;

/// Configuration for the btleplug transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BleConfig {
    /// Which host adapter to use, as an index into the list reported by the
    /// platform manager. `0` is the first (usually the only) adapter.
    pub adapter_index: usize,
}
