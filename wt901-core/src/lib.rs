pub mod protocol;

use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Radio address of the sensor, e.g. `"FF:FF:FF:FF:FF:FF"`.
///
/// Treated as an opaque identifier; the radio backend decides how to match it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceAddress(pub Box<str>);

impl DeviceAddress {
    pub fn new(address: impl Into<Box<str>>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one established link. A fresh id is minted on every (re)connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Ulid);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// The nine physical values carried by one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Motion {
    /// Acceleration in m/s².
    pub accel_x: f64,
    pub accel_y: f64,
    pub accel_z: f64,
    /// Angular velocity in °/s.
    pub gyro_x: f64,
    pub gyro_y: f64,
    pub gyro_z: f64,
    /// Orientation in degrees.
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

/// A decoded frame stamped with the moment it was received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Link the frame arrived on.
    pub session_id: SessionId,
    /// Capture instant, taken when the notification was received.
    pub timestamp: jiff::Timestamp,
    pub accel_x: f64,
    pub accel_y: f64,
    pub accel_z: f64,
    pub gyro_x: f64,
    pub gyro_y: f64,
    pub gyro_z: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl SensorReading {
    pub fn new(motion: Motion, session_id: SessionId, timestamp: jiff::Timestamp) -> Self {
        let Motion {
            accel_x,
            accel_y,
            accel_z,
            gyro_x,
            gyro_y,
            gyro_z,
            roll,
            pitch,
            yaw,
        } = motion;

        Self {
            session_id,
            timestamp,
            accel_x,
            accel_y,
            accel_z,
            gyro_x,
            gyro_y,
            gyro_z,
            roll,
            pitch,
            yaw,
        }
    }

    /// The physical values without the receipt metadata.
    pub fn motion(&self) -> Motion {
        Motion {
            accel_x: self.accel_x,
            accel_y: self.accel_y,
            accel_z: self.accel_z,
            gyro_x: self.gyro_x,
            gyro_y: self.gyro_y,
            gyro_z: self.gyro_z,
            roll: self.roll,
            pitch: self.pitch,
            yaw: self.yaw,
        }
    }
}
