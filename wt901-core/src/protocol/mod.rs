mod error;
mod frame;

pub use error::{DecodeError, DecodeResult};
pub use frame::{assemble, decode, decode_frame, to_signed};

use uuid::Uuid;

/// Service/characteristic carrying the combined accel/gyro/angle report.
pub const NOTIFY_UUID: Uuid = Uuid::from_u128(0x0000FFE5_0000_1000_8000_00805F9A34FB);

/// Value written to the client-configuration descriptor (the NOTIFY property bit).
pub const ENABLE_NOTIFY: [u8; 1] = [16];

pub const FRAME_HEADER_LEN: usize = 2;
pub const PAYLOAD_LEN: usize = 16;
pub const FRAME_LEN: usize = FRAME_HEADER_LEN + PAYLOAD_LEN;

/// Full-scale acceleration in m/s² (±16 g).
pub const ACCEL_SCALE: f64 = 16.0 * 9.8;
/// Full-scale angular velocity in °/s.
pub const GYRO_SCALE: f64 = 2000.0;
/// Full-scale angle in degrees.
pub const ANGLE_SCALE: f64 = 180.0;

pub(crate) const RAW_FULL_SCALE: f64 = 32768.0;
