//! Advertisement filter — which peripherals the scan hands to a session.

use serde::{Deserialize, Serialize};

/// Local name advertised by the sensor firmware.
pub const SENSOR_LOCAL_NAME: &str = "M5GO Env.Sensor Advertiser";

/// Exact-match filter on the advertised local name.
///
/// Set once when a scan starts and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertisementFilter {
    device_name: String,
}

impl AdvertisementFilter {
    #[must_use]
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
        }
    }

    #[must_use]
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Whether an advertisement with the given local name passes the filter.
    ///
    /// Advertisements without a local name never match.
    #[must_use]
    pub fn matches(&self, advertised_name: Option<&str>) -> bool {
        advertised_name == Some(self.device_name.as_str())
    }
}

impl Default for AdvertisementFilter {
    fn default() -> Self {
        Self::new(SENSOR_LOCAL_NAME)
    }
}
