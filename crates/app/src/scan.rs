//! Scan controller — discovers the sensor and fans advertisements into
//! sessions.
//!
//! [`ScanController`] checks the adapter, starts a scan and spawns a pump
//! that feeds every advertisement to the running [`ScanSession`]. A matching
//! advertisement from a peer without a live session claims the peer in the
//! shared [`SessionRegistry`] and spawns a [`GattSession`] for it. Repeated
//! advertisements from a claimed peer are ignored until its session ends.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt as _;

use envsensor_domain::event::{AdapterStatus, StatusEvent};
use envsensor_domain::filter::AdvertisementFilter;
use envsensor_domain::peer::PeerAddress;

use crate::ports::{
    AdapterState, Advertisement, AdvertisementStream, BleTransport, SensorObserver, TransportError,
};
use crate::session::{GattSession, SessionTimeouts};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Errors returned when a scan cannot be started or stopped.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// No BLE adapter found on the host.
    #[error("no BLE adapter available")]
    AdapterUnavailable,

    /// The adapter exists but its radio is off.
    #[error("BLE adapter is powered off")]
    AdapterDisabled,

    /// A scan started by this controller is still running.
    #[error("a scan is already running")]
    AlreadyScanning,

    /// The transport rejected the scan request.
    #[error("BLE scan error")]
    Transport(#[from] TransportError),
}

/// Lifecycle of one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning,
    Stopped,
}

/// What happened to one advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A new session was spawned for the peer.
    Started,
    /// The advertised name did not match the filter.
    Filtered,
    /// A session for the peer is already live.
    Duplicate,
    /// The scan is no longer running.
    Stopped,
}

/// Set of peer addresses that currently have a live session.
///
/// The only state shared between the scan and its sessions. Claiming and
/// releasing happen under one mutex, which upholds the
/// one-session-per-address rule under concurrent advertisement delivery.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    live: Arc<Mutex<HashSet<PeerAddress>>>,
}

impl SessionRegistry {
    /// Claim `peer`, or return `None` if it already has a live session.
    #[must_use]
    pub fn try_claim(&self, peer: PeerAddress) -> Option<SessionLease> {
        lock(&self.live).insert(peer).then(|| SessionLease {
            registry: self.clone(),
            peer,
        })
    }

    #[must_use]
    pub fn contains(&self, peer: PeerAddress) -> bool {
        lock(&self.live).contains(&peer)
    }

    /// Peers with a live session, in address order.
    #[must_use]
    pub fn peers(&self) -> Vec<PeerAddress> {
        let mut peers: Vec<_> = lock(&self.live).iter().copied().collect();
        peers.sort_unstable();
        peers
    }
}

/// Proof that a peer is claimed. Releases the claim on drop.
#[derive(Debug)]
pub struct SessionLease {
    registry: SessionRegistry,
    peer: PeerAddress,
}

impl SessionLease {
    #[must_use]
    pub fn peer(&self) -> PeerAddress {
        self.peer
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        lock(&self.registry.live).remove(&self.peer);
    }
}

/// One running scan: its filter, its state and the sessions it may spawn.
pub struct ScanSession<T, O> {
    filter: AdvertisementFilter,
    state: watch::Sender<ScanState>,
    registry: SessionRegistry,
    transport: Arc<T>,
    observer: O,
    timeouts: SessionTimeouts,
}

impl<T, O> ScanSession<T, O>
where
    T: BleTransport,
    O: SensorObserver + Clone + 'static,
{
    #[must_use]
    pub fn state(&self) -> ScanState {
        *self.state.borrow()
    }

    #[must_use]
    pub fn filter(&self) -> &AdvertisementFilter {
        &self.filter
    }

    fn stop(&self) {
        self.state.send_replace(ScanState::Stopped);
    }

    /// Handle one advertisement.
    ///
    /// Must be called from within a tokio runtime: a matching advertisement
    /// spawns the peer's session.
    pub fn on_advertisement(&self, adv: Advertisement) -> Dispatch {
        if self.state() != ScanState::Scanning {
            return Dispatch::Stopped;
        }

        if !self.filter.matches(adv.local_name.as_deref()) {
            tracing::trace!(
                peer = %adv.peer,
                name = ?adv.local_name,
                "advertisement filtered out"
            );
            return Dispatch::Filtered;
        }

        let Some(lease) = self.registry.try_claim(adv.peer) else {
            tracing::trace!(peer = %adv.peer, "session already live, ignoring advertisement");
            return Dispatch::Duplicate;
        };

        self.observer.on_status(StatusEvent::RssiUpdate {
            peer: adv.peer,
            rssi: adv.rssi,
        });

        tracing::info!(peer = %adv.peer, rssi = adv.rssi, "sensor found, connecting");

        let session =
            GattSession::new(adv.peer, self.observer.clone(), self.timeouts).with_lease(lease);
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            let peer = session.peer();
            if let Some(err) = session.run(transport.as_ref()).await {
                tracing::debug!(%peer, %err, "session ended with error");
            }
        });

        Dispatch::Started
    }
}

async fn pump<T, O>(session: Arc<ScanSession<T, O>>, mut advertisements: AdvertisementStream)
where
    T: BleTransport,
    O: SensorObserver + Clone + 'static,
{
    while let Some(adv) = advertisements.next().await {
        if session.on_advertisement(adv) == Dispatch::Stopped {
            break;
        }
    }
    if session.state() == ScanState::Scanning {
        tracing::warn!("advertisement stream ended, scan stopped");
        session.stop();
    }
}

/// Returned by [`ScanController::start`]; pass it back to
/// [`ScanController::stop`].
pub struct ScanHandle<T, O> {
    session: Arc<ScanSession<T, O>>,
    pump: JoinHandle<()>,
}

impl<T, O> ScanHandle<T, O>
where
    T: BleTransport,
    O: SensorObserver + Clone + 'static,
{
    #[must_use]
    pub fn state(&self) -> ScanState {
        self.session.state()
    }

    #[must_use]
    pub fn filter(&self) -> &AdvertisementFilter {
        self.session.filter()
    }

    /// Feed an advertisement received outside the transport's stream.
    pub fn dispatch(&self, adv: Advertisement) -> Dispatch {
        self.session.on_advertisement(adv)
    }

    /// Resolve once the scan has stopped, whether by request or because the
    /// transport ended the advertisement stream.
    pub async fn stopped(&self) {
        let mut state = self.session.state.subscribe();
        if state.wait_for(|s| *s == ScanState::Stopped).await.is_err() {
            // The sender lives in the session we hold.
            tracing::debug!("scan state channel closed");
        }
    }
}

/// What the controller is currently running.
enum Slot<T, O> {
    Idle,
    /// A `start` call holds the slot while it waits on the transport.
    Starting,
    Running(Arc<ScanSession<T, O>>),
}

/// Exclusive claim on the controller's slot for one `start` call.
///
/// Dropped without the slot moving to `Running` (transport error, or the
/// `start` future cancelled), it hands the slot back.
struct StartClaim<'a, T, O> {
    slot: &'a Mutex<Slot<T, O>>,
}

impl<T, O> Drop for StartClaim<'_, T, O> {
    fn drop(&mut self) {
        let mut slot = lock(self.slot);
        if matches!(*slot, Slot::Starting) {
            *slot = Slot::Idle;
        }
    }
}

/// Drives peripheral discovery against a [`BleTransport`].
pub struct ScanController<T, O> {
    transport: Arc<T>,
    observer: O,
    timeouts: SessionTimeouts,
    registry: SessionRegistry,
    current: Mutex<Slot<T, O>>,
}

impl<T, O> ScanController<T, O>
where
    T: BleTransport,
    O: SensorObserver + Clone + 'static,
{
    #[must_use]
    pub fn new(transport: Arc<T>, observer: O, timeouts: SessionTimeouts) -> Self {
        Self {
            transport,
            observer,
            timeouts,
            registry: SessionRegistry::default(),
            current: Mutex::new(Slot::Idle),
        }
    }

    /// Start scanning for advertisements that match `filter`.
    ///
    /// Adapter problems are reported to the observer as well as returned,
    /// and no scan is registered. There is no retry; call `start` again.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::AdapterUnavailable`] / [`ScanError::AdapterDisabled`]
    /// when the adapter cannot scan, [`ScanError::AlreadyScanning`] when a
    /// previous scan is still running, or [`ScanError::Transport`] when the
    /// transport refuses the scan.
    pub async fn start(&self, filter: AdvertisementFilter) -> Result<ScanHandle<T, O>, ScanError> {
        match self.transport.adapter_state().await? {
            AdapterState::Missing => {
                let err = ScanError::AdapterUnavailable;
                return Err(self.adapter_error(AdapterStatus::Unavailable, err));
            }
            AdapterState::PoweredOff => {
                let err = ScanError::AdapterDisabled;
                return Err(self.adapter_error(AdapterStatus::Disabled, err));
            }
            AdapterState::PoweredOn => {}
        }

        let claim = self.claim()?;
        let advertisements = self.transport.scan(&filter).await?;

        tracing::info!(device_name = filter.device_name(), "BLE scan started");

        let (state, _) = watch::channel(ScanState::Idle);
        let session = Arc::new(ScanSession {
            filter,
            state,
            registry: self.registry.clone(),
            transport: Arc::clone(&self.transport),
            observer: self.observer.clone(),
            timeouts: self.timeouts,
        });
        session.state.send_replace(ScanState::Scanning);

        let pump = tokio::spawn(pump(Arc::clone(&session), advertisements));
        *lock(claim.slot) = Slot::Running(Arc::clone(&session));

        Ok(ScanHandle { session, pump })
    }

    /// Stop the scan. Sessions it spawned keep running until their own
    /// link drops.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Transport`] if the transport fails to stop
    /// scanning; the scan is marked stopped regardless.
    pub async fn stop(&self, handle: ScanHandle<T, O>) -> Result<(), ScanError> {
        handle.session.stop();
        handle.pump.abort();

        {
            let mut current = lock(&self.current);
            if matches!(&*current, Slot::Running(scan) if Arc::ptr_eq(scan, &handle.session)) {
                *current = Slot::Idle;
            }
        }

        self.transport.stop_scan().await?;
        tracing::info!("BLE scan stopped");
        Ok(())
    }

    /// Peers that currently have a live session.
    #[must_use]
    pub fn active_peers(&self) -> Vec<PeerAddress> {
        self.registry.peers()
    }

    /// Take the slot for a new scan, unless one is running or starting.
    fn claim(&self) -> Result<StartClaim<'_, T, O>, ScanError> {
        let mut slot = lock(&self.current);
        let busy = match &*slot {
            Slot::Idle => false,
            Slot::Starting => true,
            Slot::Running(scan) => scan.state() == ScanState::Scanning,
        };
        if busy {
            return Err(ScanError::AlreadyScanning);
        }
        *slot = Slot::Starting;
        Ok(StartClaim {
            slot: &self.current,
        })
    }

    fn adapter_error(&self, status: AdapterStatus, err: ScanError) -> ScanError {
        tracing::warn!(%err, "cannot start BLE scan");
        self.observer
            .on_status(StatusEvent::Adapter { adapter: status });
        err
    }
}
