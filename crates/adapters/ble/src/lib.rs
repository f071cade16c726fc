//! # envsensor-adapter-ble
//!
//! BLE adapter — implements the `BleTransport` and `GattLink` ports on top
//! of [`btleplug`].
//!
//! ## How it works
//!
//! The sensor does not put its reading in the advertisement. It advertises
//! its local name, and a central connects, enables notifications on one
//! characteristic and receives an 8-byte frame per measurement. This crate
//! only moves bytes: scanning, connecting, subscribing and the CCCD write.
//! Filtering, session lifecycle and decoding live in `envsensor-app` and
//! `envsensor-domain`.
//!
//! ## Platform notes
//!
//! | Concern | Behaviour |
//! |---------|-----------|
//! | Adapter choice | `BleConfig::adapter_index` into `Manager::adapters()` |
//! | Advertisements | `DeviceDiscovered` / `DeviceUpdated`, nameless peers skipped |
//! | Local setup | Checks the characteristic supports `NOTIFY` |
//! | CCCD | `subscribe` / `unsubscribe`, never a raw descriptor write |
//! | Link drop | `DeviceDisconnected` ends the notification stream |
//!
//! ## Dependency rule
//!
//! Same as other adapters: depends on `envsensor-app` and `envsensor-domain`.

mod config;
mod error;
mod link;
mod transport;

pub use config::BleConfig;
pub use error::BleError;
pub use link::BtleplugLink;
pub use transport::BtleplugTransport;
