//! btleplug-backed [`GattLink`] for one connected peripheral.

use btleplug::api::{
    Central as _, CentralEvent, CharPropFlags, Characteristic, Descriptor, Peripheral as _,
};
use btleplug::platform::{Adapter, Peripheral};
use tokio_stream::{Stream, StreamExt as _};

use envsensor_app::ports::{GattLink, NotificationStream, TransportError};
use envsensor_domain::gatt::{CCCD_UUID, ENABLE_NOTIFICATION_VALUE};

use crate::error::{NO_SUCH_DESCRIPTOR, NOT_SUPPORTED, local_error, transport_error};

/// CCCD value that turns notifications and indications off.
const DISABLE_VALUE: [u8; 2] = [0x00, 0x00];

/// A connected peripheral plus the adapter that reports its link events.
pub struct BtleplugLink {
    adapter: Adapter,
    peripheral: Peripheral,
}

impl BtleplugLink {
    pub(crate) fn new(adapter: Adapter, peripheral: Peripheral) -> Self {
        Self {
            adapter,
            peripheral,
        }
    }
}

enum LinkEvent {
    Value(Vec<u8>),
    Dropped,
}

/// Values from `values` until `dropped` fires.
fn until_dropped<V, D>(values: V, dropped: D) -> impl Stream<Item = Vec<u8>> + Send
where
    V: Stream<Item = Vec<u8>> + Send,
    D: Stream<Item = ()> + Send,
{
    values
        .map(LinkEvent::Value)
        .merge(dropped.map(|()| LinkEvent::Dropped))
        .take_while(|event| matches!(event, LinkEvent::Value(_)))
        .filter_map(|event| match event {
            LinkEvent::Value(value) => Some(value),
            LinkEvent::Dropped => None,
        })
}

/// How a descriptor write is carried out through btleplug.
///
/// BlueZ and CoreBluetooth own the CCCD: BlueZ rejects client writes to it
/// and CoreBluetooth aborts on them. The CCCD is therefore only ever
/// written by `subscribe` / `unsubscribe`, which resolve once the peer
/// acknowledges the write.
#[derive(Debug, PartialEq, Eq)]
enum DescriptorWrite {
    Subscribe,
    Unsubscribe,
    Raw(Descriptor),
}

fn plan_descriptor_write(
    characteristic: &Characteristic,
    descriptor: uuid::Uuid,
    value: &[u8],
) -> Result<DescriptorWrite, TransportError> {
    if descriptor == CCCD_UUID {
        return if value == ENABLE_NOTIFICATION_VALUE.as_slice() {
            ensure_notifiable(characteristic)?;
            Ok(DescriptorWrite::Subscribe)
        } else if value == DISABLE_VALUE.as_slice() {
            Ok(DescriptorWrite::Unsubscribe)
        } else {
            // Indications are not requested by this central.
            Err(local_error(NOT_SUPPORTED))
        };
    }

    characteristic
        .descriptors
        .iter()
        .find(|d| d.uuid == descriptor)
        .cloned()
        .map(DescriptorWrite::Raw)
        .ok_or_else(|| local_error(NO_SUCH_DESCRIPTOR))
}

fn ensure_notifiable(characteristic: &Characteristic) -> Result<(), TransportError> {
    if characteristic.properties.contains(CharPropFlags::NOTIFY) {
        Ok(())
    } else {
        Err(local_error(NOT_SUPPORTED))
    }
}

impl GattLink for BtleplugLink {
    type Characteristic = Characteristic;

    async fn discover_services(&self) -> Result<(), TransportError> {
        self.peripheral
            .discover_services()
            .await
            .map_err(transport_error)
    }

    fn characteristic(
        &self,
        service: uuid::Uuid,
        characteristic: uuid::Uuid,
    ) -> Option<Characteristic> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.service_uuid == service && c.uuid == characteristic)
    }

    /// btleplug keeps no per-characteristic local registration apart from
    /// the CCCD write, so this only checks the characteristic can notify.
    async fn enable_local_notifications(
        &self,
        characteristic: &Characteristic,
    ) -> Result<(), TransportError> {
        ensure_notifiable(characteristic).inspect_err(|_| {
            tracing::warn!(
                characteristic = %characteristic.uuid,
                properties = ?characteristic.properties,
                "characteristic does not support notifications"
            );
        })
    }

    async fn write_descriptor(
        &self,
        characteristic: &Characteristic,
        descriptor: uuid::Uuid,
        value: &[u8],
    ) -> Result<(), TransportError> {
        let written = match plan_descriptor_write(characteristic, descriptor, value)? {
            DescriptorWrite::Subscribe => self.peripheral.subscribe(characteristic).await,
            DescriptorWrite::Unsubscribe => self.peripheral.unsubscribe(characteristic).await,
            DescriptorWrite::Raw(target) => self.peripheral.write_descriptor(&target, value).await,
        };
        written.map_err(transport_error)
    }

    async fn notifications(
        &self,
        characteristic: &Characteristic,
    ) -> Result<NotificationStream, TransportError> {
        let uuid = characteristic.uuid;
        let id = self.peripheral.id();

        let values = self
            .peripheral
            .notifications()
            .await
            .map_err(transport_error)?
            .filter_map(move |n| (n.uuid == uuid).then_some(n.value));

        let dropped = self
            .adapter
            .events()
            .await
            .map_err(transport_error)?
            .filter_map(move |event| {
                matches!(&event, CentralEvent::DeviceDisconnected(other) if *other == id)
                    .then_some(())
            });

        Ok(Box::pin(until_dropped(values, dropped)))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.peripheral.disconnect().await.map_err(transport_error)
    }
}
