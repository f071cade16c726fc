//! Simulated adapter: advertises the virtual sensor and hands out links.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use envsensor_app::ports::{
    AdapterState, Advertisement, AdvertisementStream, BleTransport, TransportError,
};
use envsensor_domain::error::TransportCode;
use envsensor_domain::filter::AdvertisementFilter;
use envsensor_domain::peer::PeerAddress;

use crate::config::VirtualConfig;
use crate::link::VirtualLink;
use crate::sensor::SimulatedBmp280;
use crate::CONNECTION_FAILED;

const ADVERTISEMENT_BUFFER: usize = 16;

/// In-memory [`BleTransport`] backed by one simulated peripheral.
pub struct VirtualTransport {
    config: Arc<VirtualConfig>,
    sensor: Arc<Mutex<SimulatedBmp280>>,
    advertiser: Mutex<Option<JoinHandle<()>>>,
    connections: AtomicUsize,
}

impl VirtualTransport {
    #[must_use]
    pub fn new(config: VirtualConfig) -> Self {
        Self {
            config: Arc::new(config),
            sensor: Arc::default(),
            advertiser: Mutex::new(None),
            connections: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn config(&self) -> &VirtualConfig {
        &self.config
    }

    /// Number of links handed out so far.
    #[must_use]
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    fn replace_advertiser(&self, task: Option<JoinHandle<()>>) {
        let previous = std::mem::replace(
            &mut *self
                .advertiser
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
            task,
        );
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn state(&self) -> AdapterState {
        if self.config.missing {
            AdapterState::Missing
        } else if self.config.powered_off {
            AdapterState::PoweredOff
        } else {
            AdapterState::PoweredOn
        }
    }
}

impl Default for VirtualTransport {
    fn default() -> Self {
        Self::new(VirtualConfig::default())
    }
}

impl Drop for VirtualTransport {
    fn drop(&mut self) {
        self.replace_advertiser(None);
    }
}

impl BleTransport for VirtualTransport {
    type Link = VirtualLink;

    async fn adapter_state(&self) -> Result<AdapterState, TransportError> {
        Ok(self.state())
    }

    async fn scan(
        &self,
        _filter: &AdvertisementFilter,
    ) -> Result<AdvertisementStream, TransportError> {
        if self.state() != AdapterState::PoweredOn {
            return Err(TransportError::new(TransportCode::new(CONNECTION_FAILED)));
        }

        let (tx, rx) = mpsc::channel(ADVERTISEMENT_BUFFER);
        let task = tokio::spawn(advertise(Arc::clone(&self.config), tx));
        self.replace_advertiser(Some(task));

        tracing::debug!(peer = %self.config.address, "virtual sensor advertising");
        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn stop_scan(&self) -> Result<(), TransportError> {
        self.replace_advertiser(None);
        Ok(())
    }

    async fn connect(&self, peer: PeerAddress) -> Result<VirtualLink, TransportError> {
        if peer != self.config.address || self.state() != AdapterState::PoweredOn {
            tracing::debug!(%peer, "no virtual peripheral at address");
            return Err(TransportError::new(TransportCode::new(CONNECTION_FAILED)));
        }

        self.connections.fetch_add(1, Ordering::Relaxed);
        Ok(VirtualLink::new(
            Arc::clone(&self.config),
            Arc::clone(&self.sensor),
        ))
    }
}

async fn advertise(config: Arc<VirtualConfig>, tx: mpsc::Sender<Advertisement>) {
    let mut ticker = tokio::time::interval(config.advertise_interval());
    loop {
        ticker.tick().await;
        let adv = Advertisement {
            peer: config.address,
            local_name: Some(config.local_name.clone()),
            rssi: config.rssi,
        };
        if tx.send(adv).await.is_err() {
            break;
        }
    }
}
