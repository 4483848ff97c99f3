use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CharPropFlags, Characteristic, Manager as _, Peripheral as _, ScanFilter,
    ValueNotification,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::{Stream, StreamExt};
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;
use wt901_core::DeviceAddress;

use super::{Event, LinkError, RadioStack};

const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(500);

type Notifications = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;

/// BLE backend on top of the host's Bluetooth adapter.
pub struct BleRadio {
    adapter: Adapter,
    scan_timeout: Duration,
}

pub struct BleLink {
    peripheral: Peripheral,
    notifications: Notifications,
}

impl BleRadio {
    /// Use the first Bluetooth adapter the platform reports.
    pub async fn new(scan_timeout: Duration) -> Result<Self, LinkError> {
        let manager = Manager::new().await.map_err(unexpected)?;
        let adapter = manager
            .adapters()
            .await
            .map_err(unexpected)?
            .into_iter()
            .next()
            .ok_or_else(|| LinkError::Unexpected("no Bluetooth adapter found".into()))?;

        Ok(Self {
            adapter,
            scan_timeout,
        })
    }

    async fn find(&self, address: &DeviceAddress) -> Result<Peripheral, LinkError> {
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(connect_failed)?;

        let deadline = Instant::now() + self.scan_timeout;
        let found = loop {
            let peripherals = self.adapter.peripherals().await.map_err(connect_failed)?;
            let found = peripherals.into_iter().find(|p| {
                p.address()
                    .to_string()
                    .eq_ignore_ascii_case(address.as_str())
            });

            if found.is_some() || Instant::now() >= deadline {
                break found;
            }
            sleep(SCAN_POLL_INTERVAL).await;
        };

        if let Err(e) = self.adapter.stop_scan().await {
            debug!(error = %e, "Failed to stop scan");
        }

        found.ok_or_else(|| {
            LinkError::ConnectFailed(format!(
                "{address} not seen within {}s",
                self.scan_timeout.as_secs()
            ))
        })
    }
}

#[async_trait]
impl RadioStack for BleRadio {
    type Link = BleLink;
    type Characteristic = Characteristic;

    async fn connect(&mut self, address: &DeviceAddress) -> Result<BleLink, LinkError> {
        let peripheral = self.find(address).await?;

        peripheral.connect().await.map_err(connect_failed)?;
        let notifications = peripheral.notifications().await.map_err(connect_failed)?;
        info!(%address, "BLE link opened");

        Ok(BleLink {
            peripheral,
            notifications,
        })
    }

    async fn resolve_notify_characteristic(
        &mut self,
        link: &mut BleLink,
        uuid: Uuid,
    ) -> Result<Characteristic, LinkError> {
        // Handles may change across reconnects, always rediscover.
        link.peripheral
            .discover_services()
            .await
            .map_err(link_error)?;

        let service = link
            .peripheral
            .services()
            .into_iter()
            .find(|s| s.uuid == uuid)
            .ok_or_else(|| LinkError::Unexpected(format!("service {uuid} not found")))?;

        let notify = service
            .characteristics
            .iter()
            .find(|c| c.properties.contains(CharPropFlags::NOTIFY))
            .or_else(|| service.characteristics.iter().next())
            .cloned();

        notify.ok_or_else(|| LinkError::Unexpected(format!("service {uuid} has no characteristics")))
    }

    async fn write_descriptor(
        &mut self,
        link: &mut BleLink,
        characteristic: &Characteristic,
        value: &[u8],
    ) -> Result<(), LinkError> {
        let descriptor = characteristic.descriptors.iter().next().ok_or_else(|| {
            LinkError::Unexpected(format!(
                "characteristic {} has no descriptors",
                characteristic.uuid
            ))
        })?;

        link.peripheral
            .write_descriptor(descriptor, value)
            .await
            .map_err(link_error)?;

        // The host stack only routes notifications for characteristics it
        // subscribed to itself.
        link.peripheral
            .subscribe(characteristic)
            .await
            .map_err(link_error)
    }

    async fn wait_for_notification(
        &mut self,
        link: &mut BleLink,
        wait: Duration,
    ) -> Result<Event, LinkError> {
        match timeout(wait, link.notifications.next()).await {
            Ok(Some(notification)) => Ok(Event::Payload(notification.value)),
            Ok(None) => Err(LinkError::LinkLost("notification stream closed".into())),
            Err(_) => match link.peripheral.is_connected().await {
                Ok(true) => Ok(Event::Timeout),
                Ok(false) => Err(LinkError::LinkLost("peripheral disconnected".into())),
                Err(e) => Err(link_error(e)),
            },
        }
    }

    async fn disconnect(&mut self, link: BleLink) {
        if let Err(e) = link.peripheral.disconnect().await {
            warn!(error = %e, "Failed to close BLE link");
        }
    }
}

fn connect_failed(e: btleplug::Error) -> LinkError {
    LinkError::ConnectFailed(e.to_string())
}

fn unexpected(e: btleplug::Error) -> LinkError {
    LinkError::Unexpected(e.to_string())
}

fn link_error(e: btleplug::Error) -> LinkError {
    match e {
        btleplug::Error::NotConnected => LinkError::LinkLost(e.to_string()),
        other => unexpected(other),
    }
}
