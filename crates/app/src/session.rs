//! GATT session — drives one peripheral connection through its lifecycle.
//!
//! A [`GattSession`] is created for one peer address, connects, discovers
//! the sensor service, enables notifications and then decodes every
//! notified value until the link drops. Every failure is terminal for the
//! session and is reported to the observer; the session never retries.

use std::time::Duration;

use tokio_stream::StreamExt as _;

use envsensor_domain::error::{ProtocolError, SessionError, TransportCode};
use envsensor_domain::event::StatusEvent;
use envsensor_domain::gatt::{
    CCCD_UUID, CHARACTERISTIC_UUID, ENABLE_NOTIFICATION_VALUE, SERVICE_UUID,
};
use envsensor_domain::payload;
use envsensor_domain::peer::PeerAddress;
use envsensor_domain::session::{SessionInput, SessionState};

use crate::ports::{BleTransport, GattLink, NotificationStream, SensorObserver};
use crate::scan::SessionLease;

/// Deadlines for the setup phases of a session.
///
/// The peripheral protocol itself defines none; without them a peer that
/// stops answering would keep its address claimed forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimeouts {
    /// Bounds **Connecting**.
    pub connect: Duration,
    /// Bounds **DiscoveringServices** and **EnablingNotifications** together.
    pub setup: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            setup: Duration::from_secs(10),
        }
    }
}

/// A fatal step failure: the input fed to the state machine and the error
/// reported upward.
struct Failure {
    input: SessionInput,
    error: ProtocolError,
}

impl Failure {
    fn new(input: SessionInput, error: ProtocolError) -> Self {
        Self { input, error }
    }
}

/// Owns the connection lifecycle of a single peer.
pub struct GattSession<O> {
    peer: PeerAddress,
    state: SessionState,
    observer: O,
    timeouts: SessionTimeouts,
    lease: Option<SessionLease>,
}

impl<O: SensorObserver> GattSession<O> {
    #[must_use]
    pub fn new(peer: PeerAddress, observer: O, timeouts: SessionTimeouts) -> Self {
        Self {
            peer,
            state: SessionState::Idle,
            observer,
            timeouts,
            lease: None,
        }
    }

    /// Hold `lease` until the session terminates, so the peer stays claimed
    /// in the scan registry for exactly the session's lifetime.
    pub(crate) fn with_lease(mut self, lease: SessionLease) -> Self {
        self.lease = Some(lease);
        self
    }

    #[must_use]
    pub fn peer(&self) -> PeerAddress {
        self.peer
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the session to completion.
    ///
    /// Returns the fatal protocol error, or `None` when an active link
    /// simply dropped. Either way the session ends in
    /// [`SessionState::Disconnected`] after emitting exactly one
    /// [`StatusEvent::Disconnected`].
    pub async fn run<T: BleTransport>(mut self, transport: &T) -> Option<ProtocolError> {
        self.transition(SessionInput::ConnectRequested);

        let connected =
            tokio::time::timeout(self.timeouts.connect, transport.connect(self.peer)).await;
        let link = match connected {
            Ok(Ok(link)) => link,
            Ok(Err(err)) => {
                tracing::warn!(peer = %self.peer, %err, "GATT connect failed");
                let error = ProtocolError::ConnectionFailed { code: err.code };
                return self.finish(Some(Failure::new(SessionInput::LinkFailed, error)));
            }
            Err(_) => {
                tracing::warn!(peer = %self.peer, "GATT connect timed out");
                let failure = Failure::new(SessionInput::TimedOut, ProtocolError::TimedOut);
                return self.finish(Some(failure));
            }
        };

        self.transition(SessionInput::LinkEstablished);

        let established = tokio::time::timeout(self.timeouts.setup, self.establish(&link)).await;
        let failure = match established {
            Ok(Ok(notifications)) => {
                self.receive(notifications).await;
                None
            }
            Ok(Err(failure)) => Some(failure),
            Err(_) => {
                tracing::warn!(peer = %self.peer, state = %self.state, "GATT setup timed out");
                Some(Failure::new(SessionInput::TimedOut, ProtocolError::TimedOut))
            }
        };

        if let Err(err) = link.disconnect().await {
            tracing::warn!(peer = %self.peer, %err, "failed to disconnect peripheral");
        }

        self.finish(failure)
    }

    /// Discover the sensor characteristic and subscribe to it.
    ///
    /// Local registration completes before the CCCD write is issued, and
    /// only the write's acknowledgement moves the session to **Active**.
    async fn establish<L: GattLink>(&mut self, link: &L) -> Result<NotificationStream, Failure> {
        let missing = |code: Option<TransportCode>| {
            Failure::new(
                SessionInput::DiscoveryFailed,
                ProtocolError::CharacteristicMissing { code },
            )
        };
        let subscribe_failed = |code: TransportCode| {
            Failure::new(
                SessionInput::DescriptorFailed,
                ProtocolError::SubscribeFailed { code },
            )
        };

        link.discover_services().await.map_err(|err| {
            tracing::warn!(peer = %self.peer, %err, "service discovery failed");
            missing(Some(err.code))
        })?;

        let characteristic = link
            .characteristic(SERVICE_UUID, CHARACTERISTIC_UUID)
            .ok_or_else(|| {
                tracing::warn!(peer = %self.peer, "sensor characteristic not exposed");
                missing(None)
            })?;

        self.transition(SessionInput::ServicesResolved);

        link.enable_local_notifications(&characteristic)
            .await
            .map_err(|err| subscribe_failed(err.code))?;

        let notifications = link
            .notifications(&characteristic)
            .await
            .map_err(|err| subscribe_failed(err.code))?;

        link.write_descriptor(&characteristic, CCCD_UUID, &ENABLE_NOTIFICATION_VALUE)
            .await
            .map_err(|err| {
                tracing::warn!(peer = %self.peer, %err, "CCCD write rejected");
                subscribe_failed(err.code)
            })?;

        self.transition(SessionInput::DescriptorAcknowledged);
        tracing::info!(peer = %self.peer, "sensor notifications enabled");

        Ok(notifications)
    }

    /// Decode notifications until the stream ends (link dropped).
    async fn receive(&mut self, mut notifications: NotificationStream) {
        while let Some(value) = notifications.next().await {
            self.transition(SessionInput::Notification);
            match payload::decode(&value) {
                Ok(reading) => {
                    tracing::trace!(peer = %self.peer, %reading, "reading decoded");
                    self.observer.on_reading(self.peer, reading);
                }
                Err(reason) => {
                    tracing::debug!(peer = %self.peer, %reason, "dropping malformed notification");
                    self.observer.on_error(self.peer, SessionError::Decode { reason });
                }
            }
        }
        tracing::info!(peer = %self.peer, "link dropped");
        self.transition(SessionInput::LinkDropped);
    }

    fn finish(mut self, failure: Option<Failure>) -> Option<ProtocolError> {
        let error = failure.map(|Failure { input, error }| {
            let state = self.state;
            self.transition(input);
            self.observer
                .on_error(self.peer, SessionError::Protocol { state, error });
            error
        });

        // Release the address before announcing it, so an observer that
        // reacts to the disconnect can already start a fresh session.
        drop(self.lease.take());
        self.observer
            .on_status(StatusEvent::Disconnected { peer: self.peer });

        error
    }

    fn transition(&mut self, input: SessionInput) {
        match self.state.on(input) {
            Ok(next) => {
                if next != self.state {
                    tracing::debug!(
                        peer = %self.peer,
                        from = %self.state,
                        to = %next,
                        "session transition"
                    );
                }
                self.state = next;
            }
            Err(err) => {
                tracing::warn!(peer = %self.peer, %err, "ignoring session input");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use envsensor_domain::error::DecodeError;
    use envsensor_domain::event::SensorEvent;
    use envsensor_domain::reading::SensorReading;
    use tokio::sync::broadcast;

    use crate::event_bus::InProcessEventBus;
    use crate::fake::{FakeTransport, LinkPlan};
    use crate::ports::AdapterState;

    const PEER: PeerAddress = PeerAddress::new([0x24, 0x0A, 0xC4, 0x12, 0x34, 0x56]);
    const REFERENCE_FRAME: [u8; 8] = [0x88, 0x13, 0x00, 0x00, 0x14, 0x61, 0x00, 0x00];

    fn drain(rx: &mut broadcast::Receiver<SensorEvent>) -> Vec<SensorEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    async fn run_with(plan: LinkPlan) -> (Option<ProtocolError>, Vec<SensorEvent>, FakeTransport) {
        let transport = FakeTransport::with_plan(AdapterState::PoweredOn, plan);
        let bus = InProcessEventBus::new(64);
        let mut rx = bus.subscribe();
        let session = GattSession::new(PEER, bus, SessionTimeouts::default());
        let outcome = session.run(&transport).await;
        (outcome, drain(&mut rx), transport)
    }

    fn protocol_errors(events: &[SensorEvent]) -> Vec<(SessionState, ProtocolError)> {
        events
            .iter()
            .filter_map(|event| match event {
                SensorEvent::Error {
                    error: SessionError::Protocol { state, error },
                    ..
                } => Some((*state, *error)),
                _ => None,
            })
            .collect()
    }

    fn readings(events: &[SensorEvent]) -> Vec<SensorReading> {
        events
            .iter()
            .filter_map(|event| match event {
                SensorEvent::Reading { reading, .. } => Some(*reading),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn should_start_idle() {
        let session = GattSession::new(PEER, InProcessEventBus::new(1), SessionTimeouts::default());
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.peer(), PEER);
    }

    #[tokio::test]
    async fn should_emit_readings_then_disconnect_when_link_drops() {
        let plan = LinkPlan {
            notifications: vec![REFERENCE_FRAME.to_vec()],
            ..LinkPlan::default()
        };
        let (outcome, events, _) = run_with(plan).await;

        assert_eq!(outcome, None);
        let readings = readings(&events);
        assert_eq!(readings.len(), 1);
        assert!((readings[0].temperature - 50.0).abs() < 0.001);
        assert!((readings[0].pressure - 248.52).abs() < 0.001);
        assert_eq!(
            events.last(),
            Some(&SensorEvent::Status {
                status: StatusEvent::Disconnected { peer: PEER }
            })
        );
        assert!(protocol_errors(&events).is_empty());
    }

    #[tokio::test]
    async fn should_keep_decoding_after_malformed_notification() {
        let plan = LinkPlan {
            notifications: vec![vec![0x01, 0x02, 0x03], REFERENCE_FRAME.to_vec()],
            ..LinkPlan::default()
        };
        let (outcome, events, _) = run_with(plan).await;

        assert_eq!(outcome, None);
        assert!(matches!(
            events[0],
            SensorEvent::Error {
                error: SessionError::Decode {
                    reason: DecodeError::TooShort { actual: 3 }
                },
                ..
            }
        ));
        assert_eq!(readings(&events).len(), 1);
        assert!(protocol_errors(&events).is_empty());
    }

    #[tokio::test]
    async fn should_register_locally_before_writing_descriptor() {
        let (_, _, transport) = run_with(LinkPlan::default()).await;
        assert_eq!(
            transport.calls(PEER),
            vec![
                "discover_services",
                "enable_local_notifications",
                "notifications",
                "write_descriptor",
                "disconnect",
            ]
        );
    }

    #[tokio::test]
    async fn should_report_single_subscribe_failure_when_descriptor_write_fails() {
        let plan = LinkPlan {
            descriptor_error: Some(133),
            notifications: vec![REFERENCE_FRAME.to_vec()],
            ..LinkPlan::default()
        };
        let (outcome, events, transport) = run_with(plan).await;

        let expected = ProtocolError::SubscribeFailed {
            code: TransportCode::new(133),
        };
        assert_eq!(outcome, Some(expected));
        assert_eq!(
            protocol_errors(&events),
            vec![(SessionState::EnablingNotifications, expected)]
        );
        assert!(readings(&events).is_empty());
        assert_eq!(transport.calls(PEER).last(), Some(&"disconnect"));
    }

    #[tokio::test]
    async fn should_report_subscribe_failure_when_local_registration_fails() {
        let plan = LinkPlan {
            local_enable_error: Some(5),
            ..LinkPlan::default()
        };
        let (outcome, _, transport) = run_with(plan).await;

        assert_eq!(
            outcome,
            Some(ProtocolError::SubscribeFailed {
                code: TransportCode::new(5)
            })
        );
        assert!(!transport.calls(PEER).contains(&"write_descriptor"));
    }

    #[tokio::test]
    async fn should_report_missing_characteristic() {
        let plan = LinkPlan {
            missing_characteristic: true,
            ..LinkPlan::default()
        };
        let (outcome, events, _) = run_with(plan).await;

        assert_eq!(
            protocol_errors(&events),
            vec![(
                SessionState::DiscoveringServices,
                ProtocolError::CharacteristicMissing { code: None }
            )]
        );
        assert!(outcome.is_some());
    }

    #[tokio::test]
    async fn should_report_discovery_failure_as_missing_characteristic() {
        let plan = LinkPlan {
            discovery_error: Some(129),
            ..LinkPlan::default()
        };
        let (outcome, _, _) = run_with(plan).await;

        assert_eq!(
            outcome,
            Some(ProtocolError::CharacteristicMissing {
                code: Some(TransportCode::new(129))
            })
        );
    }

    #[tokio::test]
    async fn should_report_connection_failure_without_touching_gatt() {
        let plan = LinkPlan {
            connect_error: Some(62),
            ..LinkPlan::default()
        };
        let (outcome, events, transport) = run_with(plan).await;

        assert_eq!(
            protocol_errors(&events),
            vec![(
                SessionState::Connecting,
                ProtocolError::ConnectionFailed {
                    code: TransportCode::new(62)
                }
            )]
        );
        assert!(outcome.is_some());
        assert!(transport.calls(PEER).is_empty());
        assert_eq!(
            events.last(),
            Some(&SensorEvent::Status {
                status: StatusEvent::Disconnected { peer: PEER }
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn should_time_out_hanging_connect() {
        let plan = LinkPlan {
            hang_on_connect: true,
            ..LinkPlan::default()
        };
        let (outcome, events, _) = run_with(plan).await;

        assert_eq!(outcome, Some(ProtocolError::TimedOut));
        assert_eq!(
            protocol_errors(&events),
            vec![(SessionState::Connecting, ProtocolError::TimedOut)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn should_time_out_unacknowledged_descriptor_write() {
        let plan = LinkPlan {
            hang_on_descriptor: true,
            ..LinkPlan::default()
        };
        let (outcome, events, transport) = run_with(plan).await;

        assert_eq!(outcome, Some(ProtocolError::TimedOut));
        assert_eq!(
            protocol_errors(&events),
            vec![(SessionState::EnablingNotifications, ProtocolError::TimedOut)]
        );
        assert_eq!(transport.calls(PEER).last(), Some(&"disconnect"));
    }
}
