//! btleplug-backed [`BleTransport`].
//!
//! Advertisements are resolved from central events by a forwarder task and
//! handed to the core through a bounded channel. Stopping the scan aborts
//! the forwarder, which closes the stream.

use std::sync::{Mutex, PoisonError};

use btleplug::api::{
    BDAddr, Central, CentralEvent, CentralState, Manager as _, Peripheral as _,
    PeripheralProperties, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, PeripheralId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt as _};

use envsensor_app::ports::{
    AdapterState, Advertisement, AdvertisementStream, BleTransport, TransportError,
};
use envsensor_domain::filter::AdvertisementFilter;
use envsensor_domain::peer::PeerAddress;

use crate::config::BleConfig;
use crate::error::{BleError, no_adapter, transport_error};
use crate::link::BtleplugLink;

const ADVERTISEMENT_BUFFER: usize = 64;

pub(crate) fn peer_address(address: BDAddr) -> PeerAddress {
    PeerAddress::from(address.into_inner())
}

pub(crate) fn bd_addr(peer: PeerAddress) -> BDAddr {
    BDAddr::from(peer.octets())
}

/// Build an advertisement from peripheral properties.
///
/// Peripherals without a local name or an RSSI are skipped: the sensor
/// always advertises its name, and the RSSI is reported to observers.
pub(crate) fn advertisement_from(properties: &PeripheralProperties) -> Option<Advertisement> {
    let local_name = properties.local_name.clone()?;
    let rssi = properties.rssi?;
    Some(Advertisement {
        peer: peer_address(properties.address),
        local_name: Some(local_name),
        rssi,
    })
}

/// BLE transport driving one host adapter through btleplug.
pub struct BtleplugTransport {
    adapter: Option<Adapter>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl BtleplugTransport {
    /// Open the platform manager and select the configured adapter.
    ///
    /// A missing adapter is not an error here: it is reported as
    /// [`AdapterState::Missing`] when a scan is requested.
    ///
    /// # Errors
    ///
    /// Returns [`BleError::Manager`] when the platform BLE stack cannot be
    /// reached.
    pub async fn new(config: &BleConfig) -> Result<Self, BleError> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .nth(config.adapter_index);

        match &adapter {
            Some(adapter) => {
                let info = adapter.adapter_info().await.unwrap_or_default();
                tracing::info!(index = config.adapter_index, adapter = %info, "using BLE adapter");
            }
            None => {
                tracing::warn!(index = config.adapter_index, "no BLE adapter at configured index");
            }
        }

        Ok(Self {
            adapter,
            forwarder: Mutex::new(None),
        })
    }

    fn adapter(&self) -> Result<&Adapter, TransportError> {
        self.adapter.as_ref().ok_or_else(no_adapter)
    }

    fn replace_forwarder(&self, task: Option<JoinHandle<()>>) {
        let previous = std::mem::replace(
            &mut *self.forwarder.lock().unwrap_or_else(PoisonError::into_inner),
            task,
        );
        if let Some(previous) = previous {
            previous.abort();
        }
    }
}

impl Drop for BtleplugTransport {
    fn drop(&mut self) {
        self.replace_forwarder(None);
    }
}

impl BleTransport for BtleplugTransport {
    type Link = BtleplugLink;

    async fn adapter_state(&self) -> Result<AdapterState, TransportError> {
        let Some(adapter) = &self.adapter else {
            return Ok(AdapterState::Missing);
        };
        let state = adapter.adapter_state().await.map_err(transport_error)?;
        Ok(match state {
            CentralState::PoweredOff => AdapterState::PoweredOff,
            // Backends that cannot report power get to try the scan.
            CentralState::PoweredOn | CentralState::Unknown => AdapterState::PoweredOn,
        })
    }

    async fn scan(
        &self,
        filter: &AdvertisementFilter,
    ) -> Result<AdvertisementStream, TransportError> {
        let adapter = self.adapter()?.clone();
        let events = adapter.events().await.map_err(transport_error)?;
        adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(transport_error)?;

        let (tx, rx) = mpsc::channel(ADVERTISEMENT_BUFFER);
        let task = tokio::spawn(forward_advertisements(adapter, events, filter.clone(), tx));
        self.replace_forwarder(Some(task));

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn stop_scan(&self) -> Result<(), TransportError> {
        self.replace_forwarder(None);
        self.adapter()?.stop_scan().await.map_err(transport_error)
    }

    async fn connect(&self, peer: PeerAddress) -> Result<BtleplugLink, TransportError> {
        let adapter = self.adapter()?;
        let address = bd_addr(peer);

        let peripheral = adapter
            .peripherals()
            .await
            .map_err(transport_error)?
            .into_iter()
            .find(|p| p.address() == address)
            .ok_or_else(|| transport_error(btleplug::Error::DeviceNotFound))?;

        peripheral.connect().await.map_err(transport_error)?;
        tracing::debug!(%peer, "BLE link established");

        Ok(BtleplugLink::new(adapter.clone(), peripheral))
    }
}

/// Resolve discovery events into advertisements until the receiver goes
/// away or the adapter stops reporting events.
async fn forward_advertisements<S>(
    adapter: Adapter,
    mut events: S,
    filter: AdvertisementFilter,
    tx: mpsc::Sender<Advertisement>,
) where
    S: Stream<Item = CentralEvent> + Unpin + Send,
{
    while let Some(event) = events.next().await {
        let (CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id)) = event else {
            continue;
        };

        let Some(adv) = resolve(&adapter, &id).await else {
            continue;
        };

        // Cheap pre-filter; the scan session checks again.
        if !filter.matches(adv.local_name.as_deref()) {
            continue;
        }

        if tx.send(adv).await.is_err() {
            break;
        }
    }
    tracing::debug!("BLE advertisement forwarder finished");
}

async fn resolve(adapter: &Adapter, id: &PeripheralId) -> Option<Advertisement> {
    let peripheral = match adapter.peripheral(id).await {
        Ok(peripheral) => peripheral,
        Err(err) => {
            tracing::trace!(%err, "advertising peripheral vanished");
            return None;
        }
    };
    match peripheral.properties().await {
        Ok(Some(properties)) => advertisement_from(&properties),
        Ok(None) => None,
        Err(err) => {
            tracing::warn!(%err, "failed to read peripheral properties");
            None
        }
    }
}
