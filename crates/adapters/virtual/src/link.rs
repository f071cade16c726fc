//! Simulated GATT link to the virtual sensor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use envsensor_app::ports::{GattLink, NotificationStream, TransportError};
use envsensor_domain::error::TransportCode;
use envsensor_domain::gatt::{
    CCCD_UUID, CHARACTERISTIC_UUID, ENABLE_NOTIFICATION_VALUE, SERVICE_UUID,
};

use crate::config::VirtualConfig;
use crate::sensor::{self, SimulatedBmp280};
use crate::{ATTRIBUTE_NOT_FOUND, GATT_ERROR};

const NOTIFICATION_BUFFER: usize = 16;

fn gatt_error(code: u16) -> TransportError {
    TransportError::new(TransportCode::new(code))
}

/// Link to the virtual peripheral.
///
/// Notifications flow only after the CCCD has been written with the
/// enable value, like on a real peripheral.
pub struct VirtualLink {
    config: Arc<VirtualConfig>,
    sensor: Arc<Mutex<SimulatedBmp280>>,
    discovered: AtomicBool,
    notifying: watch::Sender<bool>,
    publisher: Mutex<Option<JoinHandle<()>>>,
}

impl VirtualLink {
    pub(crate) fn new(config: Arc<VirtualConfig>, sensor: Arc<Mutex<SimulatedBmp280>>) -> Self {
        Self {
            config,
            sensor,
            discovered: AtomicBool::new(false),
            notifying: watch::channel(false).0,
            publisher: Mutex::new(None),
        }
    }

    /// Whether the peer has notifications enabled in its CCCD.
    #[must_use]
    pub fn is_notifying(&self) -> bool {
        *self.notifying.borrow()
    }

    fn replace_publisher(&self, task: Option<JoinHandle<()>>) {
        let previous = std::mem::replace(
            &mut *self
                .publisher
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
            task,
        );
        if let Some(previous) = previous {
            previous.abort();
        }
    }
}

impl Drop for VirtualLink {
    fn drop(&mut self) {
        self.replace_publisher(None);
    }
}

impl GattLink for VirtualLink {
    type Characteristic = uuid::Uuid;

    async fn discover_services(&self) -> Result<(), TransportError> {
        self.discovered.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn characteristic(
        &self,
        service: uuid::Uuid,
        characteristic: uuid::Uuid,
    ) -> Option<uuid::Uuid> {
        let exposed = self.discovered.load(Ordering::Relaxed)
            && !self.config.omit_characteristic
            && service == SERVICE_UUID
            && characteristic == CHARACTERISTIC_UUID;
        exposed.then_some(characteristic)
    }

    async fn enable_local_notifications(
        &self,
        _characteristic: &uuid::Uuid,
    ) -> Result<(), TransportError> {
        Ok(())
    }

    async fn write_descriptor(
        &self,
        _characteristic: &uuid::Uuid,
        descriptor: uuid::Uuid,
        value: &[u8],
    ) -> Result<(), TransportError> {
        if descriptor != CCCD_UUID {
            return Err(gatt_error(ATTRIBUTE_NOT_FOUND));
        }
        if self.config.fail_descriptor_write {
            tracing::debug!(peer = %self.config.address, "rejecting CCCD write");
            return Err(gatt_error(GATT_ERROR));
        }
        self.notifying
            .send_replace(value == ENABLE_NOTIFICATION_VALUE.as_slice());
        Ok(())
    }

    async fn notifications(
        &self,
        _characteristic: &uuid::Uuid,
    ) -> Result<NotificationStream, TransportError> {
        let (tx, rx) = mpsc::channel(NOTIFICATION_BUFFER);
        let task = tokio::spawn(publish(
            Arc::clone(&self.config),
            Arc::clone(&self.sensor),
            self.notifying.subscribe(),
            tx,
        ));
        self.replace_publisher(Some(task));
        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.replace_publisher(None);
        self.notifying.send_replace(false);
        Ok(())
    }
}

/// Notify one frame per interval while enabled. Returning drops `tx`,
/// which ends the stream the same way a dropped link does.
async fn publish(
    config: Arc<VirtualConfig>,
    sensor: Arc<Mutex<SimulatedBmp280>>,
    mut enabled: watch::Receiver<bool>,
    tx: mpsc::Sender<Vec<u8>>,
) {
    let ready = enabled.wait_for(|on| *on).await.is_ok();
    if !ready {
        return;
    }

    let mut ticker = tokio::time::interval(config.notify_interval());
    let mut sent: u32 = 0;
    loop {
        ticker.tick().await;
        let reading = sensor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sample();
        if tx.send(sensor::frame(&reading, config.legacy_frames)).await.is_err() {
            return;
        }
        sent += 1;

        if config.link_lifetime.is_some_and(|limit| sent >= limit) {
            tracing::info!(
                peer = %config.address,
                notifications = sent,
                "virtual sensor dropping link"
            );
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use envsensor_domain::payload;
    use tokio_stream::StreamExt as _;

    use super::*;

    fn link(config: VirtualConfig) -> VirtualLink {
        VirtualLink::new(Arc::new(config), Arc::default())
    }

    async fn subscribed(link: &VirtualLink) -> NotificationStream {
        link.discover_services().await.unwrap();
        let characteristic = link.characteristic(SERVICE_UUID, CHARACTERISTIC_UUID).unwrap();
        link.enable_local_notifications(&characteristic).await.unwrap();
        let stream = link.notifications(&characteristic).await.unwrap();
        link.write_descriptor(&characteristic, CCCD_UUID, &ENABLE_NOTIFICATION_VALUE)
            .await
            .unwrap();
        stream
    }

    #[tokio::test]
    async fn should_hide_characteristic_before_discovery() {
        let link = link(VirtualConfig::default());
        assert!(link.characteristic(SERVICE_UUID, CHARACTERISTIC_UUID).is_none());

        link.discover_services().await.unwrap();
        assert!(link.characteristic(SERVICE_UUID, CHARACTERISTIC_UUID).is_some());
    }

    #[tokio::test]
    async fn should_omit_characteristic_when_configured() {
        let link = link(VirtualConfig {
            omit_characteristic: true,
            ..VirtualConfig::default()
        });

        link.discover_services().await.unwrap();

        assert!(link.characteristic(SERVICE_UUID, CHARACTERISTIC_UUID).is_none());
    }

    #[tokio::test]
    async fn should_reject_unknown_descriptor() {
        let link = link(VirtualConfig::default());

        let err = link
            .write_descriptor(&CHARACTERISTIC_UUID, SERVICE_UUID, &ENABLE_NOTIFICATION_VALUE)
            .await
            .unwrap_err();

        assert_eq!(err.code.get(), ATTRIBUTE_NOT_FOUND);
    }

    #[tokio::test]
    async fn should_fail_descriptor_write_when_configured() {
        let link = link(VirtualConfig {
            fail_descriptor_write: true,
            ..VirtualConfig::default()
        });

        let err = link
            .write_descriptor(&CHARACTERISTIC_UUID, CCCD_UUID, &ENABLE_NOTIFICATION_VALUE)
            .await
            .unwrap_err();

        assert_eq!(err.code.get(), GATT_ERROR);
        assert!(!link.is_notifying());
    }

    #[tokio::test(start_paused = true)]
    async fn should_not_notify_before_cccd_write() {
        let link = link(VirtualConfig::default());
        link.discover_services().await.unwrap();
        let mut stream = link.notifications(&CHARACTERISTIC_UUID).await.unwrap();

        let first = tokio::time::timeout(Duration::from_secs(10), stream.next()).await;

        assert!(first.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn should_notify_decodable_frames_once_enabled() {
        let link = link(VirtualConfig::default());
        let mut stream = subscribed(&link).await;

        let value = stream.next().await.unwrap();

        assert!(link.is_notifying());
        let reading = payload::decode(&value).unwrap();
        assert!((reading.temperature - 24.0).abs() < 2.0);
        assert!((reading.pressure - 1013.25).abs() < 3.0);
    }

    #[tokio::test(start_paused = true)]
    async fn should_notify_legacy_frames_when_configured() {
        let link = link(VirtualConfig {
            legacy_frames: true,
            ..VirtualConfig::default()
        });
        let mut stream = subscribed(&link).await;

        let value = stream.next().await.unwrap();

        assert_eq!(value.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn should_drop_link_after_lifetime() {
        let link = link(VirtualConfig {
            link_lifetime: Some(3),
            ..VirtualConfig::default()
        });
        let stream = subscribed(&link).await;

        let values: Vec<_> = stream.collect().await;

        assert_eq!(values.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn should_end_stream_on_disconnect() {
        let link = link(VirtualConfig::default());
        let mut stream = subscribed(&link).await;
        stream.next().await.unwrap();

        link.disconnect().await.unwrap();

        let rest: Vec<_> = stream.collect().await;
        assert!(rest.len() <= NOTIFICATION_BUFFER);
        assert!(!link.is_notifying());
    }
}
