//! Scriptable in-memory transport for the app-layer tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use envsensor_domain::error::TransportCode;
use envsensor_domain::filter::AdvertisementFilter;
use envsensor_domain::gatt::{CHARACTERISTIC_UUID, SERVICE_UUID};
use envsensor_domain::peer::PeerAddress;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::ports::{
    AdapterState, Advertisement, AdvertisementStream, BleTransport, GattLink, NotificationStream,
    TransportError,
};

/// How every link created by the fake behaves.
#[derive(Debug, Clone, Default)]
pub(crate) struct LinkPlan {
    pub connect_error: Option<u16>,
    pub hang_on_connect: bool,
    pub discovery_error: Option<u16>,
    pub missing_characteristic: bool,
    pub local_enable_error: Option<u16>,
    pub descriptor_error: Option<u16>,
    pub hang_on_descriptor: bool,
    /// Values queued on the link as soon as it is up.
    pub notifications: Vec<Vec<u8>>,
    /// Keep the link up after the queued values until `drop_link`.
    pub hold_open: bool,
}

#[derive(Default)]
struct Inner {
    connects: Vec<PeerAddress>,
    scans: usize,
    stopped_scans: usize,
    next_scan_error: Option<u16>,
    advertiser: Option<mpsc::UnboundedSender<Advertisement>>,
    notifiers: HashMap<PeerAddress, mpsc::UnboundedSender<Vec<u8>>>,
    calls: Vec<(PeerAddress, &'static str)>,
}

pub(crate) struct FakeTransport {
    adapter: AdapterState,
    plan: LinkPlan,
    inner: Arc<Mutex<Inner>>,
}

impl FakeTransport {
    pub fn new(adapter: AdapterState) -> Self {
        Self::with_plan(adapter, LinkPlan::default())
    }

    pub fn with_plan(adapter: AdapterState, plan: LinkPlan) -> Self {
        Self {
            adapter,
            plan,
            inner: Arc::default(),
        }
    }

    /// Deliver an advertisement on the running scan.
    pub fn advertise(&self, adv: Advertisement) -> bool {
        let inner = self.inner.lock().unwrap();
        inner
            .advertiser
            .as_ref()
            .is_some_and(|tx| tx.send(adv).is_ok())
    }

    /// Make the next `scan` call fail with `code`.
    pub fn fail_next_scan(&self, code: u16) {
        self.inner.lock().unwrap().next_scan_error = Some(code);
    }

    /// End the advertisement stream as if the adapter went away.
    pub fn end_scan(&self) {
        self.inner.lock().unwrap().advertiser = None;
    }

    pub fn notify(&self, peer: PeerAddress, value: Vec<u8>) -> bool {
        let inner = self.inner.lock().unwrap();
        inner
            .notifiers
            .get(&peer)
            .is_some_and(|tx| tx.send(value).is_ok())
    }

    /// Drop the link to `peer`, ending its notification stream.
    pub fn drop_link(&self, peer: PeerAddress) {
        self.inner.lock().unwrap().notifiers.remove(&peer);
    }

    pub fn connect_count(&self) -> usize {
        self.inner.lock().unwrap().connects.len()
    }

    pub fn scan_count(&self) -> usize {
        self.inner.lock().unwrap().scans
    }

    pub fn stopped_scan_count(&self) -> usize {
        self.inner.lock().unwrap().stopped_scans
    }

    /// GATT calls made on links to `peer`, in order.
    pub fn calls(&self, peer: PeerAddress) -> Vec<&'static str> {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(p, _)| *p == peer)
            .map(|(_, call)| *call)
            .collect()
    }
}

fn fail(code: Option<u16>) -> Result<(), TransportError> {
    match code {
        Some(code) => Err(TransportError::new(TransportCode::new(code))),
        None => Ok(()),
    }
}

impl BleTransport for FakeTransport {
    type Link = FakeLink;

    async fn adapter_state(&self) -> Result<AdapterState, TransportError> {
        Ok(self.adapter)
    }

    async fn scan(
        &self,
        _filter: &AdvertisementFilter,
    ) -> Result<AdvertisementStream, TransportError> {
        // Real transports suspend while the radio starts scanning.
        tokio::task::yield_now().await;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().unwrap();
        inner.scans += 1;
        fail(inner.next_scan_error.take())?;
        inner.advertiser = Some(tx);
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn stop_scan(&self) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.stopped_scans += 1;
        inner.advertiser = None;
        Ok(())
    }

    async fn connect(&self, peer: PeerAddress) -> Result<FakeLink, TransportError> {
        self.inner.lock().unwrap().connects.push(peer);
        if self.plan.hang_on_connect {
            std::future::pending::<()>().await;
        }
        fail(self.plan.connect_error)?;

        let (tx, rx) = mpsc::unbounded_channel();
        for value in &self.plan.notifications {
            let _ = tx.send(value.clone());
        }
        if self.plan.hold_open {
            self.inner.lock().unwrap().notifiers.insert(peer, tx);
        }

        Ok(FakeLink {
            peer,
            plan: self.plan.clone(),
            inner: Arc::clone(&self.inner),
            values: Mutex::new(Some(rx)),
        })
    }
}

pub(crate) struct FakeLink {
    peer: PeerAddress,
    plan: LinkPlan,
    inner: Arc<Mutex<Inner>>,
    values: Mutex<Option<mpsc::UnboundedReceiver<Vec<u8>>>>,
}

impl FakeLink {
    fn record(&self, call: &'static str) {
        self.inner.lock().unwrap().calls.push((self.peer, call));
    }
}

impl GattLink for FakeLink {
    type Characteristic = uuid::Uuid;

    async fn discover_services(&self) -> Result<(), TransportError> {
        self.record("discover_services");
        fail(self.plan.discovery_error)
    }

    fn characteristic(
        &self,
        service: uuid::Uuid,
        characteristic: uuid::Uuid,
    ) -> Option<uuid::Uuid> {
        let present = !self.plan.missing_characteristic
            && service == SERVICE_UUID
            && characteristic == CHARACTERISTIC_UUID;
        present.then_some(characteristic)
    }

    async fn enable_local_notifications(
        &self,
        _characteristic: &uuid::Uuid,
    ) -> Result<(), TransportError> {
        self.record("enable_local_notifications");
        fail(self.plan.local_enable_error)
    }

    async fn write_descriptor(
        &self,
        _characteristic: &uuid::Uuid,
        _descriptor: uuid::Uuid,
        _value: &[u8],
    ) -> Result<(), TransportError> {
        self.record("write_descriptor");
        if self.plan.hang_on_descriptor {
            std::future::pending::<()>().await;
        }
        fail(self.plan.descriptor_error)
    }

    async fn notifications(
        &self,
        _characteristic: &uuid::Uuid,
    ) -> Result<NotificationStream, TransportError> {
        self.record("notifications");
        let rx = self
            .values
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| TransportError::new(TransportCode::new(99)))?;
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.record("disconnect");
        self.inner.lock().unwrap().notifiers.remove(&self.peer);
        Ok(())
    }
}
