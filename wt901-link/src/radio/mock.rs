use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;
use wt901_core::DeviceAddress;

use super::{Event, LinkError, RadioStack};

/// A call made against a [`ScriptedRadio`], in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect(DeviceAddress),
    Resolve(Uuid),
    WriteDescriptor(Vec<u8>),
    Wait(Duration),
    Disconnect(u64),
}

/// Shared view of the calls a [`ScriptedRadio`] has received.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl CallLog {
    fn push(&self, call: Call) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    /// Snapshot of every call so far.
    pub fn calls(&self) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|call| matches(call))
            .count()
    }
}

/// Link handle handed out by [`ScriptedRadio`]; `id` counts successful connects.
#[derive(Debug)]
pub struct ScriptedLink {
    pub id: u64,
}

/// Radio backend that replays scripted outcomes.
///
/// Each operation pops its next outcome from its own queue. An empty queue
/// means success, except for waits: once the wait script runs dry the radio
/// reports [`Event::Timeout`]. With a token registered through
/// [`ScriptedRadio::cancel_when_exhausted`] it cancels the token and returns at
/// once, which lets a pump under test finish on its own; without one it sits
/// out the full timeout like a silent device.
#[derive(Default)]
pub struct ScriptedRadio {
    connects: VecDeque<Result<(), LinkError>>,
    resolves: VecDeque<Result<(), LinkError>>,
    writes: VecDeque<Result<(), LinkError>>,
    waits: VecDeque<Result<Event, LinkError>>,
    exhausted: Option<CancellationToken>,
    resolve_delay: Duration,
    links_opened: u64,
    log: CallLog,
}

impl ScriptedRadio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect_outcomes(
        mut self,
        outcomes: impl IntoIterator<Item = Result<(), LinkError>>,
    ) -> Self {
        self.connects.extend(outcomes);
        self
    }

    pub fn resolve_outcomes(
        mut self,
        outcomes: impl IntoIterator<Item = Result<(), LinkError>>,
    ) -> Self {
        self.resolves.extend(outcomes);
        self
    }

    pub fn write_outcomes(
        mut self,
        outcomes: impl IntoIterator<Item = Result<(), LinkError>>,
    ) -> Self {
        self.writes.extend(outcomes);
        self
    }

    pub fn wait_outcomes(
        mut self,
        outcomes: impl IntoIterator<Item = Result<Event, LinkError>>,
    ) -> Self {
        self.waits.extend(outcomes);
        self
    }

    /// Make every resolve take `delay` before answering.
    pub fn resolve_delay(mut self, delay: Duration) -> Self {
        self.resolve_delay = delay;
        self
    }

    pub fn cancel_when_exhausted(mut self, cancel: CancellationToken) -> Self {
        self.exhausted = Some(cancel);
        self
    }

    /// Handle for inspecting calls after the radio has been moved into a session.
    pub fn log(&self) -> CallLog {
        self.log.clone()
    }
}

#[async_trait]
impl RadioStack for ScriptedRadio {
    type Link = ScriptedLink;
    type Characteristic = Uuid;

    async fn connect(&mut self, address: &DeviceAddress) -> Result<ScriptedLink, LinkError> {
        self.log.push(Call::Connect(address.clone()));
        self.connects.pop_front().unwrap_or(Ok(()))?;

        self.links_opened += 1;
        Ok(ScriptedLink {
            id: self.links_opened,
        })
    }

    async fn resolve_notify_characteristic(
        &mut self,
        _link: &mut ScriptedLink,
        uuid: Uuid,
    ) -> Result<Uuid, LinkError> {
        self.log.push(Call::Resolve(uuid));
        if !self.resolve_delay.is_zero() {
            sleep(self.resolve_delay).await;
        }
        self.resolves.pop_front().unwrap_or(Ok(()))?;
        Ok(uuid)
    }

    async fn write_descriptor(
        &mut self,
        _link: &mut ScriptedLink,
        _characteristic: &Uuid,
        value: &[u8],
    ) -> Result<(), LinkError> {
        self.log.push(Call::WriteDescriptor(value.to_vec()));
        self.writes.pop_front().unwrap_or(Ok(()))
    }

    async fn wait_for_notification(
        &mut self,
        _link: &mut ScriptedLink,
        timeout: Duration,
    ) -> Result<Event, LinkError> {
        self.log.push(Call::Wait(timeout));

        match self.waits.pop_front() {
            Some(outcome) => outcome,
            None => {
                match &self.exhausted {
                    Some(cancel) => {
                        debug!("Wait script exhausted, cancelling");
                        cancel.cancel();
                    }
                    None => sleep(timeout).await,
                }
                Ok(Event::Timeout)
            }
        }
    }

    async fn disconnect(&mut self, link: ScriptedLink) {
        self.log.push(Call::Disconnect(link.id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    fn address() -> DeviceAddress {
        DeviceAddress::new("FF:FF:FF:FF:FF:FF")
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_waits_sit_out_the_timeout() {
        let mut radio = ScriptedRadio::new().wait_outcomes([Ok(Event::Payload(vec![0x55]))]);
        let mut link = radio.connect(&address()).await.unwrap();

        let started = Instant::now();
        let first = radio
            .wait_for_notification(&mut link, Duration::from_secs(15))
            .await;
        assert_eq!(first, Ok(Event::Payload(vec![0x55])));
        assert_eq!(started.elapsed(), Duration::ZERO);

        for _ in 0..3 {
            let event = radio
                .wait_for_notification(&mut link, Duration::from_secs(15))
                .await;
            assert_eq!(event, Ok(Event::Timeout));
        }
        assert_eq!(started.elapsed(), Duration::from_secs(45));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_waits_cancel_the_registered_token() {
        let cancel = CancellationToken::new();
        let mut radio = ScriptedRadio::new().cancel_when_exhausted(cancel.clone());
        let mut link = radio.connect(&address()).await.unwrap();

        let started = Instant::now();
        let event = radio
            .wait_for_notification(&mut link, Duration::from_secs(15))
            .await;

        assert_eq!(event, Ok(Event::Timeout));
        assert!(cancel.is_cancelled());
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn resolve_delay_holds_the_answer() {
        let mut radio = ScriptedRadio::new().resolve_delay(Duration::from_secs(10));
        let mut link = radio.connect(&address()).await.unwrap();

        let started = Instant::now();
        let resolved = radio
            .resolve_notify_characteristic(&mut link, Uuid::nil())
            .await;

        assert_eq!(resolved, Ok(Uuid::nil()));
        assert_eq!(started.elapsed(), Duration::from_secs(10));
        assert_eq!(
            radio.log().calls(),
            vec![Call::Connect(address()), Call::Resolve(Uuid::nil())]
        );
    }
}
