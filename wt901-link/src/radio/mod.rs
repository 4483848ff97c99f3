#[cfg(feature = "ble")]
pub mod ble;
pub mod mock;
pub mod sim;

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;
use wt901_core::DeviceAddress;

/// Outcome of waiting for a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Raw notification bytes (header included).
    Payload(Vec<u8>),
    /// Nothing arrived before the timeout. Not a failure.
    Timeout,
}

/// Failures reported by a radio backend, tagged by the recovery they need.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    /// Link establishment failed or timed out. Retried.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// An established link dropped. The session reconnects.
    #[error("link lost: {0}")]
    LinkLost(String),

    /// Anything else. Logged, the session carries on.
    #[error("unexpected radio error: {0}")]
    Unexpected(String),
}

/// The operations the session needs from a BLE stack.
///
/// One session drives one backend; every call is made from the same task, so
/// implementations never see concurrent calls for the same link.
#[async_trait]
pub trait RadioStack: Send + 'static {
    /// Handle for an open connection.
    type Link: Send;
    /// Resolved reference to the notify characteristic and its descriptors.
    type Characteristic: Send + Sync;

    /// Open a link to the device.
    async fn connect(&mut self, address: &DeviceAddress) -> Result<Self::Link, LinkError>;

    /// Find the service identified by `uuid` and return its notify characteristic.
    async fn resolve_notify_characteristic(
        &mut self,
        link: &mut Self::Link,
        uuid: Uuid,
    ) -> Result<Self::Characteristic, LinkError>;

    /// Write `value` to the characteristic's client-configuration descriptor.
    async fn write_descriptor(
        &mut self,
        link: &mut Self::Link,
        characteristic: &Self::Characteristic,
        value: &[u8],
    ) -> Result<(), LinkError>;

    /// Block up to `timeout` for the next notification.
    async fn wait_for_notification(
        &mut self,
        link: &mut Self::Link,
        timeout: Duration,
    ) -> Result<Event, LinkError>;

    /// Close the link. Best effort, failures are only logged.
    async fn disconnect(&mut self, link: Self::Link);
}
