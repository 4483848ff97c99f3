use std::io::Write;

use tokio::sync::mpsc;
use tracing::{info, warn};
use wt901_core::SensorReading;
use wt901_core::protocol::DecodeError;

/// Receives the outcome of every frame the pump decodes.
///
/// Delivery is fire-and-forget: a sink that cannot keep up or fails to write
/// logs and drops the reading, it never stalls the link.
pub trait ReadingSink: Send {
    fn deliver(&mut self, outcome: Result<SensorReading, DecodeError>);
}

impl<F> ReadingSink for F
where
    F: FnMut(Result<SensorReading, DecodeError>) + Send,
{
    fn deliver(&mut self, outcome: Result<SensorReading, DecodeError>) {
        self(outcome)
    }
}

fn log_decode_error(error: &DecodeError) {
    warn!(error = %error, "Dropping malformed frame");
}

/// Logs each reading as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ReadingSink for TracingSink {
    fn deliver(&mut self, outcome: Result<SensorReading, DecodeError>) {
        match outcome {
            Ok(r) => info!(
                session_id = %r.session_id,
                timestamp = %r.timestamp,
                accel_x = r.accel_x,
                accel_y = r.accel_y,
                accel_z = r.accel_z,
                gyro_x = r.gyro_x,
                gyro_y = r.gyro_y,
                gyro_z = r.gyro_z,
                roll = r.roll,
                pitch = r.pitch,
                yaw = r.yaw,
                "Reading"
            ),
            Err(e) => log_decode_error(&e),
        }
    }
}

/// Writes one JSON object per reading, newline separated.
pub struct JsonLinesSink<W> {
    writer: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write(&mut self, reading: &SensorReading) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.writer, reading)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}

impl<W: Write + Send> ReadingSink for JsonLinesSink<W> {
    fn deliver(&mut self, outcome: Result<SensorReading, DecodeError>) {
        match outcome {
            Ok(reading) => {
                if let Err(e) = self.write(&reading) {
                    warn!(error = %e, "Failed to write reading");
                }
            }
            Err(e) => log_decode_error(&e),
        }
    }
}

/// Forwards outcomes into a bounded channel for another task to consume.
pub struct ChannelSink {
    tx: mpsc::Sender<Result<SensorReading, DecodeError>>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Result<SensorReading, DecodeError>>) -> Self {
        Self { tx }
    }

    /// Create a sink together with the receiving end of its channel.
    pub fn channel(
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Result<SensorReading, DecodeError>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

impl ReadingSink for ChannelSink {
    fn deliver(&mut self, outcome: Result<SensorReading, DecodeError>) {
        match self.tx.try_send(outcome) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Reading channel full, dropping reading");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Reading channel closed, dropping reading");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;
    use wt901_core::{Motion, SessionId};

    fn reading() -> SensorReading {
        let motion = Motion {
            accel_z: 9.8,
            yaw: -45.0,
            ..Default::default()
        };
        SensorReading::new(
            motion,
            SessionId(Ulid::nil()),
            jiff::Timestamp::UNIX_EPOCH,
        )
    }

    fn truncated() -> DecodeError {
        DecodeError::Truncated {
            needed: 18,
            available: 4,
        }
    }

    #[test]
    fn json_lines_writes_one_object_per_reading() {
        let mut sink = JsonLinesSink::new(Vec::new());

        sink.deliver(Ok(reading()));
        sink.deliver(Err(truncated()));
        sink.deliver(Ok(reading()));

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let value: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(value["accel_z"], 9.8);
        assert_eq!(value["yaw"], -45.0);
        assert_eq!(value["timestamp"], "1970-01-01T00:00:00Z");

        let parsed: SensorReading = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed, reading());
    }

    #[tokio::test]
    async fn channel_sink_forwards_outcomes() {
        let (mut sink, mut rx) = ChannelSink::channel(4);

        sink.deliver(Ok(reading()));
        sink.deliver(Err(truncated()));

        assert_eq!(rx.recv().await, Some(Ok(reading())));
        assert_eq!(rx.recv().await, Some(Err(truncated())));
    }

    #[test]
    fn channel_sink_drops_when_full() {
        let (mut sink, mut rx) = ChannelSink::channel(1);

        sink.deliver(Ok(reading()));
        sink.deliver(Err(truncated()));

        assert_eq!(rx.try_recv(), Ok(Ok(reading())));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closures_are_sinks() {
        let mut seen = Vec::new();
        {
            let mut sink = |outcome: Result<SensorReading, DecodeError>| seen.push(outcome.is_ok());
            sink.deliver(Ok(reading()));
            sink.deliver(Err(truncated()));
        }
        assert_eq!(seen, vec![true, false]);
    }

    #[test]
    fn tracing_sink_accepts_both_outcomes() {
        let mut sink = TracingSink;
        sink.deliver(Ok(reading()));
        sink.deliver(Err(truncated()));
    }
}
