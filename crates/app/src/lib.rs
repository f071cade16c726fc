//! # envsensor-app
//!
//! Application layer — use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement:
//!   - `BleTransport` / `GattLink`: scanning, connecting and GATT access
//!   - `SensorObserver`: the consumer of readings, errors and status
//! - Drive one peripheral connection through its lifecycle (`session`)
//! - Fan matching advertisements into at most one session per peer (`scan`)
//! - Provide an in-process observer (event bus) that doesn't need IO
//!
//! ## Dependency rule
//! Depends on `envsensor-domain` only (plus `tokio` for tasks, timers and
//! channels). Never imports adapter crates. Adapters depend on *this* crate,
//! not the reverse.

pub mod event_bus;
pub mod ports;
pub mod scan;
pub mod session;

#[cfg(test)]
mod fake;
