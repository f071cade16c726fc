//! Virtual peripheral configuration.

use std::time::Duration;

use serde::Deserialize;

use envsensor_domain::filter::SENSOR_LOCAL_NAME;
use envsensor_domain::peer::PeerAddress;

/// Configuration for the simulated sensor.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct VirtualConfig {
    /// Address the peripheral advertises from.
    pub address: PeerAddress,
    /// Advertised local name.
    pub local_name: String,
    /// Reported signal strength, in dBm.
    pub rssi: i16,
    /// Milliseconds between advertisements while scanning.
    pub advertise_interval_ms: u64,
    /// Milliseconds between notifications once subscribed.
    pub notify_interval_ms: u64,
    /// Send the 4-byte frame of the original firmware instead of the 8-byte one.
    pub legacy_frames: bool,
    /// Reject the CCCD write with [`GATT_ERROR`](crate::GATT_ERROR).
    pub fail_descriptor_write: bool,
    /// Expose the service without the sensor characteristic.
    pub omit_characteristic: bool,
    /// Report the adapter as powered off.
    pub powered_off: bool,
    /// Report no adapter at all.
    pub missing: bool,
    /// Drop the link after this many notifications.
    pub link_lifetime: Option<u32>,
}

impl Default for VirtualConfig {
    fn default() -> Self {
        Self {
            address: PeerAddress::new([0x24, 0x0A, 0xC4, 0x00, 0xE5, 0x01]),
            local_name: SENSOR_LOCAL_NAME.to_string(),
            rssi: -60,
            advertise_interval_ms: 500,
            notify_interval_ms: 1000,
            legacy_frames: false,
            fail_descriptor_write: false,
            omit_characteristic: false,
            powered_off: false,
            missing: false,
            link_lifetime: None,
        }
    }
}

impl VirtualConfig {
    #[must_use]
    pub fn advertise_interval(&self) -> Duration {
        Duration::from_millis(self.advertise_interval_ms.max(1))
    }

    #[must_use]
    pub fn notify_interval(&self) -> Duration {
        Duration::from_millis(self.notify_interval_ms.max(1))
    }
}
