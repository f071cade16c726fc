//! # envsensor-adapter-virtual
//!
//! Virtual transport that simulates the M5GO environment sensor for demos
//! and end-to-end tests. No radio involved.
//!
//! ## Simulated peripheral
//!
//! | Aspect | Behaviour |
//! |--------|-----------|
//! | Advertisement | Configured address, local name and RSSI every `advertise_interval_ms` |
//! | GATT | Sensor service + notify characteristic + CCCD |
//! | Notifications | 8-byte frame every `notify_interval_ms` once the CCCD is written |
//! | Reading | BMP280-like drift around 24 °C / 1013 hPa |
//!
//! Fault injection (`legacy_frames`, `fail_descriptor_write`,
//! `omit_characteristic`, `powered_off`, `missing`, `link_lifetime`) lets the
//! error paths of the core run without hardware.
//!
//! ## Dependency rule
//!
//! Depends on `envsensor-app` (port traits) and `envsensor-domain` only.

mod config;
mod link;
mod sensor;
mod transport;

pub use config::VirtualConfig;
pub use link::VirtualLink;
pub use transport::VirtualTransport;

/// HCI "connection failed to be established".
pub const CONNECTION_FAILED: u16 = 0x3E;
/// ATT "attribute not found".
pub const ATTRIBUTE_NOT_FOUND: u16 = 0x0A;
/// Generic GATT failure as reported by most stacks.
pub const GATT_ERROR: u16 = 0x85;
