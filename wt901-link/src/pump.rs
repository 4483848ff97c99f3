use std::time::Duration;

use jiff::Timestamp;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use wt901_core::SensorReading;
use wt901_core::protocol::decode_frame;

use crate::radio::{Event, LinkError, RadioStack};
use crate::session::{Session, SessionStats};
use crate::sink::ReadingSink;

pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(15);

/// What the pump saw over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PumpReport {
    pub frames: u64,
    pub decode_errors: u64,
    pub idle_timeouts: u64,
    pub radio_errors: u64,
    pub session: SessionStats,
}

/// Drives a [`Session`]: waits for notifications, decodes them, hands the
/// results to a [`ReadingSink`] and reconnects when the link drops.
pub struct NotificationPump<R: RadioStack, S: ReadingSink> {
    session: Session<R>,
    sink: S,
    cancel: CancellationToken,
    notify_timeout: Duration,
    resubscribe_on_idle: bool,
    report: PumpReport,
}

impl<R: RadioStack, S: ReadingSink> NotificationPump<R, S> {
    pub fn new(session: Session<R>, sink: S, cancel: CancellationToken) -> Self {
        Self {
            session,
            sink,
            cancel,
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
            resubscribe_on_idle: true,
            report: PumpReport::default(),
        }
    }

    pub fn with_notify_timeout(mut self, notify_timeout: Duration) -> Self {
        self.notify_timeout = notify_timeout;
        self
    }

    /// Refresh the subscription whenever a wait times out with no frame.
    pub fn with_resubscribe_on_idle(mut self, resubscribe_on_idle: bool) -> Self {
        self.resubscribe_on_idle = resubscribe_on_idle;
        self
    }

    /// Run until the cancellation token fires.
    ///
    /// Link failures never end the loop; they are recovered by reconnecting.
    #[instrument(name = "pump", skip_all, fields(address = %self.session.address()))]
    pub async fn run(mut self) -> PumpReport {
        info!(
            notify_timeout_secs = self.notify_timeout.as_secs(),
            resubscribe_on_idle = self.resubscribe_on_idle,
            "Notification pump started"
        );

        if self.session.establish(&self.cancel).await {
            self.pump().await;
        }

        self.session.shutdown().await;
        self.report.session = self.session.stats();
        info!(
            frames = self.report.frames,
            decode_errors = self.report.decode_errors,
            links_lost = self.report.session.links_lost,
            "Notification pump stopped"
        );

        self.report
    }

    async fn pump(&mut self) {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                event = self.session.wait_for_notification(self.notify_timeout) => event,
            };

            match event {
                Ok(Event::Payload(frame)) => self.handle_frame(&frame),
                Ok(Event::Timeout) => {
                    self.report.idle_timeouts += 1;
                    debug!("No notification before timeout");

                    if self.resubscribe_on_idle {
                        if let Err(e) = self.session.resubscribe().await {
                            if !self.handle_error(e).await {
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    if !self.handle_error(e).await {
                        break;
                    }
                }
            }
        }
    }

    /// Apply the recovery for `error`. Returns `false` if the pump should stop.
    ///
    /// A lost link is reconnected. Anything else is logged and the
    /// subscription is refreshed on the link still in place.
    async fn handle_error(&mut self, error: LinkError) -> bool {
        match error {
            LinkError::LinkLost(_) => self.reconnect(&error).await,
            LinkError::ConnectFailed(_) | LinkError::Unexpected(_) => {
                self.report.radio_errors += 1;
                warn!(error = %error, "Radio error, refreshing subscription");

                match self.session.resubscribe().await {
                    Ok(()) => true,
                    Err(e @ LinkError::LinkLost(_)) => self.reconnect(&e).await,
                    Err(e) => {
                        self.report.radio_errors += 1;
                        warn!(error = %e, "Failed to refresh subscription, continuing");
                        true
                    }
                }
            }
        }
    }

    async fn reconnect(&mut self, reason: &LinkError) -> bool {
        self.session.link_lost(reason).await;
        self.session.establish(&self.cancel).await
    }

    fn handle_frame(&mut self, frame: &[u8]) {
        let received_at = Timestamp::now();
        let Some(session_id) = self.session.session_id() else {
            return;
        };

        let outcome =
            decode_frame(frame).map(|motion| SensorReading::new(motion, session_id, received_at));
        match &outcome {
            Ok(_) => self.report.frames += 1,
            Err(_) => self.report.decode_errors += 1,
        }

        self.sink.deliver(outcome);
    }
}
