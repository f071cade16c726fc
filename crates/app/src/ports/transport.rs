//! BLE transport port — the radio capability consumed by the core.
//!
//! A platform binding (btleplug, a simulator, …) implements [`BleTransport`]
//! for the adapter and [`GattLink`] for one connected peripheral. Results
//! that the platform delivers through callbacks are modelled as futures and
//! streams; absent platform objects are modelled as `Option`.

use std::future::Future;
use std::pin::Pin;

use envsensor_domain::error::TransportCode;
use envsensor_domain::filter::AdvertisementFilter;
use envsensor_domain::peer::PeerAddress;
use tokio_stream::Stream;

/// Advertisements delivered while a scan is running.
pub type AdvertisementStream = Pin<Box<dyn Stream<Item = Advertisement> + Send>>;

/// Raw characteristic values notified by the peripheral.
///
/// The stream ends when the link drops.
pub type NotificationStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

/// One received advertisement frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub peer: PeerAddress,
    pub local_name: Option<String>,
    pub rssi: i16,
}

/// Availability of the host BLE adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    /// No adapter present.
    Missing,
    /// Adapter present, radio off.
    PoweredOff,
    PoweredOn,
}

/// Failure reported by the transport.
///
/// The code is opaque to the core and only forwarded to observers.
#[derive(Debug, thiserror::Error)]
#[error("BLE transport error (code {code})")]
pub struct TransportError {
    pub code: TransportCode,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TransportError {
    #[must_use]
    pub fn new(code: TransportCode) -> Self {
        Self { code, source: None }
    }

    pub fn with_source(
        code: TransportCode,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            source: Some(Box::new(source)),
        }
    }
}

/// Host-side BLE capability: adapter state, scanning and connecting.
pub trait BleTransport: Send + Sync + 'static {
    /// A connected GATT link to one peripheral.
    type Link: GattLink + 'static;

    /// Report whether an adapter exists and is powered.
    fn adapter_state(&self) -> impl Future<Output = Result<AdapterState, TransportError>> + Send;

    /// Start scanning and return the advertisement stream.
    ///
    /// Implementations may pre-filter using `filter`; the core re-checks
    /// every advertisement regardless.
    fn scan(
        &self,
        filter: &AdvertisementFilter,
    ) -> impl Future<Output = Result<AdvertisementStream, TransportError>> + Send;

    /// Stop the running scan. Existing links are not affected.
    fn stop_scan(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Establish a link to `peer`. Resolves once the link is up.
    fn connect(
        &self,
        peer: PeerAddress,
    ) -> impl Future<Output = Result<Self::Link, TransportError>> + Send;
}

/// GATT access over an established link.
pub trait GattLink: Send + Sync {
    /// Platform handle to a discovered characteristic.
    type Characteristic: Send + Sync;

    /// Discover services and characteristics on the peer.
    fn discover_services(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Look up a discovered characteristic. `None` when the service or the
    /// characteristic is absent.
    fn characteristic(
        &self,
        service: uuid::Uuid,
        characteristic: uuid::Uuid,
    ) -> Option<Self::Characteristic>;

    /// Register locally for value-change delivery on `characteristic`.
    fn enable_local_notifications(
        &self,
        characteristic: &Self::Characteristic,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Write a descriptor of `characteristic` and resolve on the peer's
    /// acknowledgement.
    fn write_descriptor(
        &self,
        characteristic: &Self::Characteristic,
        descriptor: uuid::Uuid,
        value: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Stream of values notified on `characteristic`.
    fn notifications(
        &self,
        characteristic: &Self::Characteristic,
    ) -> impl Future<Output = Result<NotificationStream, TransportError>> + Send;

    /// Tear the link down and release its resources.
    fn disconnect(&self) -> impl Future<Output = Result<(), TransportError>> + Send;
}
