use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, info};
use uuid::Uuid;
use wt901_core::DeviceAddress;
use wt901_core::protocol::{
    ACCEL_SCALE, ANGLE_SCALE, FRAME_HEADER_LEN, FRAME_LEN, GYRO_SCALE, NOTIFY_UUID,
};

use super::{Event, LinkError, RadioStack};

/// Header the sensor puts in front of the combined accel/gyro/angle report.
const FRAME_HEADER: [u8; FRAME_HEADER_LEN] = [0x55, 0x61];

/// Standard gravity as the sensor reports it.
const GRAVITY: f64 = 9.8;

/// Radio backend that fabricates a sensor lying flat and slowly turning.
///
/// Connect attempts and established links fail at random so the reconnect
/// path gets exercised without hardware.
pub struct SimulatedRadio {
    /// Delay between generated frames.
    frame_interval: Duration,
    /// One in `drop_ratio` waits reports a lost link; 0 disables drops.
    drop_ratio: u32,
    /// One in `connect_failure_ratio` connects fails; 0 disables failures.
    connect_failure_ratio: u32,
    /// Current heading of the simulated sensor, in degrees.
    yaw: f64,
    links_opened: u64,
}

/// Link to the simulated sensor.
pub struct SimulatedLink {
    id: u64,
}

impl SimulatedRadio {
    pub fn new(frame_interval: Duration, drop_ratio: u32, connect_failure_ratio: u32) -> Self {
        Self {
            frame_interval,
            drop_ratio,
            connect_failure_ratio,
            yaw: 0.0,
            links_opened: 0,
        }
    }

    fn next_frame(&mut self) -> Vec<u8> {
        let mut rng = rand::rng();

        self.yaw += 1.5;
        if self.yaw >= 180.0 {
            self.yaw -= 360.0;
        }

        let fields = [
            (rng.random_range(-0.2..0.2), ACCEL_SCALE),
            (rng.random_range(-0.2..0.2), ACCEL_SCALE),
            (GRAVITY + rng.random_range(-0.2..0.2), ACCEL_SCALE),
            (rng.random_range(-2.0..2.0), GYRO_SCALE),
            (rng.random_range(-2.0..2.0), GYRO_SCALE),
            (15.0 + rng.random_range(-2.0..2.0), GYRO_SCALE),
            (rng.random_range(-1.0..1.0), ANGLE_SCALE),
            (rng.random_range(-1.0..1.0), ANGLE_SCALE),
            (self.yaw, ANGLE_SCALE),
        ];

        let mut raw = fields.map(|(value, scale)| (value / scale * 32768.0).round() as i16);

        // Each group of three starts on the previous group's last byte, so the
        // first field of a group takes the preceding field's high byte as its
        // low byte. Accel Z and gyro Z arrive intact; gyro X and roll absorb
        // the difference.
        for shared in [3, 6] {
            let [_, carried] = raw[shared - 1].to_le_bytes();
            let [_, high] = raw[shared].to_le_bytes();
            raw[shared] = i16::from_le_bytes([carried, high]);
        }

        let mut frame = vec![0u8; FRAME_LEN];
        frame[..FRAME_HEADER_LEN].copy_from_slice(&FRAME_HEADER);
        let payload = &mut frame[FRAME_HEADER_LEN..];
        for (index, value) in raw.into_iter().enumerate() {
            let offset = index * 2 - index / 3;
            payload[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
        }

        frame
    }

    fn chance(ratio: u32) -> bool {
        ratio > 0 && rand::rng().random_ratio(1, ratio)
    }
}

#[async_trait]
impl RadioStack for SimulatedRadio {
    type Link = SimulatedLink;
    type Characteristic = Uuid;

    async fn connect(&mut self, address: &DeviceAddress) -> Result<SimulatedLink, LinkError> {
        tokio::time::sleep(Duration::from_millis(250)).await;

        if Self::chance(self.connect_failure_ratio) {
            return Err(LinkError::ConnectFailed(format!(
                "simulated device {address} did not answer"
            )));
        }

        self.links_opened += 1;
        info!(%address, link = self.links_opened, "Simulated link opened");
        Ok(SimulatedLink {
            id: self.links_opened,
        })
    }

    async fn resolve_notify_characteristic(
        &mut self,
        _link: &mut SimulatedLink,
        uuid: Uuid,
    ) -> Result<Uuid, LinkError> {
        if uuid != NOTIFY_UUID {
            return Err(LinkError::Unexpected(format!("no service {uuid}")));
        }
        Ok(uuid)
    }

    async fn write_descriptor(
        &mut self,
        link: &mut SimulatedLink,
        characteristic: &Uuid,
        value: &[u8],
    ) -> Result<(), LinkError> {
        debug!(link = link.id, %characteristic, ?value, "Simulated descriptor write");
        Ok(())
    }

    async fn wait_for_notification(
        &mut self,
        link: &mut SimulatedLink,
        timeout: Duration,
    ) -> Result<Event, LinkError> {
        if self.frame_interval > timeout {
            tokio::time::sleep(timeout).await;
            return Ok(Event::Timeout);
        }

        tokio::time::sleep(self.frame_interval).await;

        if Self::chance(self.drop_ratio) {
            return Err(LinkError::LinkLost(format!(
                "simulated link {} dropped",
                link.id
            )));
        }

        Ok(Event::Payload(self.next_frame()))
    }

    async fn disconnect(&mut self, link: SimulatedLink) {
        debug!(link = link.id, "Simulated link closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wt901_core::protocol::decode_frame;

    #[test]
    fn generated_frames_decode() {
        let mut radio = SimulatedRadio::new(Duration::from_millis(10), 0, 0);

        for _ in 0..50 {
            let frame = radio.next_frame();
            assert_eq!(frame.len(), FRAME_LEN);
            assert_eq!(&frame[..2], &FRAME_HEADER);

            let motion = decode_frame(&frame).unwrap();
            assert!((motion.accel_y).abs() < 0.25);
            assert!((motion.accel_z - GRAVITY).abs() < 0.25);
            assert!((motion.gyro_z - 15.0).abs() < 2.1);
            assert!((motion.pitch).abs() < 1.1);
            assert!((motion.yaw - radio.yaw).abs() < 0.01);
            // the byte-sharing fields stay small
            assert!(motion.gyro_x.abs() <= 256.0 / 32768.0 * GYRO_SCALE);
            assert!(motion.roll.abs() <= 256.0 / 32768.0 * ANGLE_SCALE);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_frames_time_out() {
        let mut radio = SimulatedRadio::new(Duration::from_secs(20), 0, 0);
        let address = DeviceAddress::new("00:11:22:33:44:55");

        let mut link = radio.connect(&address).await.unwrap();
        let event = radio
            .wait_for_notification(&mut link, Duration::from_secs(15))
            .await
            .unwrap();
        assert_eq!(event, Event::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_service_is_rejected() {
        let mut radio = SimulatedRadio::new(Duration::from_millis(10), 0, 0);
        let mut link = radio
            .connect(&DeviceAddress::new("00:11:22:33:44:55"))
            .await
            .unwrap();

        let result = radio
            .resolve_notify_characteristic(&mut link, Uuid::nil())
            .await;
        assert!(matches!(result, Err(LinkError::Unexpected(_))));
    }
}
