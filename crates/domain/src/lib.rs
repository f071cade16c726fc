//! # envsensor-domain
//!
//! Pure domain model for the environmental sensor monitor.
//!
//! ## Responsibilities
//! - Value objects: [`SensorReading`](reading::SensorReading),
//!   [`PeerAddress`](peer::PeerAddress),
//!   [`AdvertisementFilter`](filter::AdvertisementFilter)
//! - The notification wire format (decode / encode of the 8-byte frame)
//! - The fixed GATT identifiers of the sensor peripheral
//! - The connection state machine as a pure transition table
//! - Error and event types reported to observers
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! The BLE transport is expressed as traits in the `app` crate (ports).

pub mod error;
pub mod event;
pub mod filter;
pub mod gatt;
pub mod payload;
pub mod peer;
pub mod reading;
pub mod session;
