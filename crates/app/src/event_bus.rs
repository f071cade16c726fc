//! In-process event bus backed by a tokio broadcast channel.

use tokio::sync::broadcast;

use envsensor_domain::error::SessionError;
use envsensor_domain::event::{SensorEvent, StatusEvent};
use envsensor_domain::peer::PeerAddress;
use envsensor_domain::reading::SensorReading;

use crate::ports::SensorObserver;

/// In-process event bus using a tokio [`broadcast`] channel.
///
/// Implements [`SensorObserver`] by wrapping every callback into a
/// [`SensorEvent`]. Publishing succeeds even when there are no active
/// subscribers (the event is simply dropped).
#[derive(Debug, Clone)]
pub struct InProcessEventBus {
    sender: broadcast::Sender<SensorEvent>,
}

impl InProcessEventBus {
    /// Create a new event bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events on this bus.
    ///
    /// Returns a receiver that will get all events published *after*
    /// the subscription is created.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SensorEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: SensorEvent) {
        // Fails only when nobody is subscribed.
        let _ = self.sender.send(event);
    }
}

impl SensorObserver for InProcessEventBus {
    fn on_reading(&self, peer: PeerAddress, reading: SensorReading) {
        self.publish(SensorEvent::Reading { peer, reading });
    }

    fn on_error(&self, peer: PeerAddress, error: SessionError) {
        self.publish(SensorEvent::Error { peer, error });
    }

    fn on_status(&self, status: StatusEvent) {
        self.publish(SensorEvent::Status { status });
    }
}
