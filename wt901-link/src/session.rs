use std::time::Duration;

use serde::Serialize;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use ulid::Ulid;
use uuid::Uuid;
use wt901_core::protocol::{ENABLE_NOTIFY, NOTIFY_UUID};
use wt901_core::{DeviceAddress, SessionId};

use crate::radio::{Event, LinkError, RadioStack};

pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(60);

/// Lifecycle of the link to the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Subscribed,
}

/// Counters kept across the lifetime of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub connect_attempts: u64,
    pub connect_failures: u64,
    pub subscriptions: u64,
    pub resubscriptions: u64,
    pub links_lost: u64,
}

struct ActiveLink<L> {
    id: SessionId,
    link: L,
}

/// Owns the radio backend and the one link to the sensor.
///
/// All link mutation goes through the transition methods; the link handle is
/// never exposed.
pub struct Session<R: RadioStack> {
    radio: R,
    address: DeviceAddress,
    notify_uuid: Uuid,
    retry_interval: Duration,
    state: SessionState,
    active: Option<ActiveLink<R::Link>>,
    stats: SessionStats,
}

impl<R: RadioStack> Session<R> {
    pub fn new(radio: R, address: DeviceAddress) -> Self {
        Self {
            radio,
            address,
            notify_uuid: NOTIFY_UUID,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            state: SessionState::Disconnected,
            active: None,
            stats: SessionStats::default(),
        }
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    pub fn with_notify_uuid(mut self, notify_uuid: Uuid) -> Self {
        self.notify_uuid = notify_uuid;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    /// Id of the current link, if subscribed.
    pub fn session_id(&self) -> Option<SessionId> {
        self.active.as_ref().map(|active| active.id)
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "Session state changed");
            self.state = next;
        }
    }

    /// Resolve the notify characteristic and enable notifications on it.
    async fn subscribe(
        radio: &mut R,
        link: &mut R::Link,
        notify_uuid: Uuid,
    ) -> Result<(), LinkError> {
        let characteristic = radio.resolve_notify_characteristic(link, notify_uuid).await?;
        radio
            .write_descriptor(link, &characteristic, &ENABLE_NOTIFY)
            .await
    }

    /// Make one connection attempt: connect, resolve, enable notifications.
    ///
    /// Ends in `Subscribed` on success and `Disconnected` on failure. Calling
    /// it while already subscribed returns the current link's id.
    pub async fn connect_once(&mut self) -> Result<SessionId, LinkError> {
        self.attempt(&CancellationToken::new())
            .await
            .unwrap_or_else(|| Err(LinkError::Unexpected("connection attempt cancelled".into())))
    }

    /// One connection attempt that stops early if `cancel` fires.
    ///
    /// Returns `None` when cancelled. A link opened before the cancellation is
    /// closed again before returning.
    async fn attempt(
        &mut self,
        cancel: &CancellationToken,
    ) -> Option<Result<SessionId, LinkError>> {
        if let Some(active) = &self.active {
            return Some(Ok(active.id));
        }

        self.transition(SessionState::Connecting);
        self.stats.connect_attempts += 1;

        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.radio.connect(&self.address) => Some(result),
        };

        let mut link = match connected {
            None => {
                self.transition(SessionState::Disconnected);
                return None;
            }
            Some(Ok(link)) => link,
            Some(Err(e)) => {
                self.stats.connect_failures += 1;
                self.transition(SessionState::Disconnected);
                return Some(Err(e));
            }
        };

        let subscribed = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = Self::subscribe(&mut self.radio, &mut link, self.notify_uuid) => Some(result),
        };

        match subscribed {
            Some(Ok(())) => {}
            None => {
                debug!("Cancelled while subscribing, closing link");
                self.radio.disconnect(link).await;
                self.transition(SessionState::Disconnected);
                return None;
            }
            Some(Err(e)) => {
                self.stats.connect_failures += 1;
                self.radio.disconnect(link).await;
                self.transition(SessionState::Disconnected);
                return Some(Err(e));
            }
        }

        let id = SessionId(Ulid::new());
        self.active = Some(ActiveLink { id, link });
        self.stats.subscriptions += 1;
        self.transition(SessionState::Subscribed);
        info!(address = %self.address, session_id = %id, "Subscribed to notifications");

        Some(Ok(id))
    }

    /// Connect, retrying every `retry_interval` until an attempt succeeds.
    ///
    /// There is no attempt limit. Returns `false` only if `cancel` fires first,
    /// in which case the session is left `Disconnected` with no link open.
    pub async fn establish(&mut self, cancel: &CancellationToken) -> bool {
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;

            match self.attempt(cancel).await {
                None => break,
                Some(Ok(session_id)) => {
                    if attempt > 1 {
                        info!(attempt, %session_id, "Reconnected");
                    }
                    return true;
                }
                Some(Err(e)) => {
                    warn!(
                        address = %self.address,
                        attempt,
                        error = %e,
                        retry_in_secs = self.retry_interval.as_secs(),
                        "Connection attempt failed, will retry"
                    );
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = sleep(self.retry_interval) => {}
            }
        }

        info!("Connection attempts cancelled");
        self.transition(SessionState::Disconnected);
        false
    }

    /// Drop the current link after the radio reported it gone.
    pub async fn link_lost(&mut self, reason: &LinkError) {
        if let Some(active) = self.active.take() {
            warn!(session_id = %active.id, error = %reason, "Link lost");
            self.radio.disconnect(active.link).await;
            self.stats.links_lost += 1;
        }
        self.transition(SessionState::Disconnected);
    }

    /// Re-resolve the characteristic and rewrite the descriptor on the
    /// current link. Subscriptions are not guaranteed to persist on the device.
    pub async fn resubscribe(&mut self) -> Result<(), LinkError> {
        let Some(active) = self.active.as_mut() else {
            return Err(LinkError::Unexpected("resubscribe without a link".into()));
        };

        Self::subscribe(&mut self.radio, &mut active.link, self.notify_uuid).await?;
        self.stats.resubscriptions += 1;
        debug!(session_id = %active.id, "Subscription refreshed");
        Ok(())
    }

    /// Wait up to `timeout` for the next notification on the current link.
    pub async fn wait_for_notification(&mut self, timeout: Duration) -> Result<Event, LinkError> {
        let Some(active) = self.active.as_mut() else {
            return Err(LinkError::Unexpected(
                "waiting for notifications without a link".into(),
            ));
        };

        self.radio
            .wait_for_notification(&mut active.link, timeout)
            .await
    }

    /// Close the link, if any, and return to `Disconnected`.
    pub async fn shutdown(&mut self) {
        if let Some(active) = self.active.take() {
            info!(session_id = %active.id, "Closing link");
            self.radio.disconnect(active.link).await;
        }
        self.transition(SessionState::Disconnected);
    }
}
