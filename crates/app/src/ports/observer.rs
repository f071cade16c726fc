//! Observer port — the consumer of everything the core reports.
//!
//! The core never renders anything. It hands readings, errors and status
//! changes to a [`SensorObserver`] supplied at construction. Calls come from
//! whichever task drives the scan or a session, so implementations must be
//! cheap and must not block.

use std::sync::Arc;

use envsensor_domain::error::SessionError;
use envsensor_domain::event::StatusEvent;
use envsensor_domain::peer::PeerAddress;
use envsensor_domain::reading::SensorReading;

/// Receives readings, errors and status updates.
pub trait SensorObserver: Send + Sync {
    /// A notification was decoded.
    fn on_reading(&self, peer: PeerAddress, reading: SensorReading);

    /// A session reported a decode failure (non-fatal) or a protocol
    /// failure (session terminated).
    fn on_error(&self, peer: PeerAddress, error: SessionError);

    /// Adapter availability, signal strength or disconnection.
    fn on_status(&self, status: StatusEvent);
}

impl<T: SensorObserver + ?Sized> SensorObserver for Arc<T> {
    fn on_reading(&self, peer: PeerAddress, reading: SensorReading) {
        (**self).on_reading(peer, reading);
    }

    fn on_error(&self, peer: PeerAddress, error: SessionError) {
        (**self).on_error(peer, error);
    }

    fn on_status(&self, status: StatusEvent) {
        (**self).on_status(status);
    }
}
