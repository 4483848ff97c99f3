use super::{
    ACCEL_SCALE, ANGLE_SCALE, FRAME_HEADER_LEN, FRAME_LEN, GYRO_SCALE, PAYLOAD_LEN,
    RAW_FULL_SCALE,
    error::{DecodeError, DecodeResult},
};
use crate::Motion;

// frame structure : header(2) + payload(16)
//
// The payload carries nine little-endian i16 fields in three groups of three.
// Consecutive groups share one byte: the high byte of accel Z is also the low
// byte of gyro X, and the high byte of gyro Z is the low byte of roll.

/// (low, high) payload offsets of the acceleration X/Y/Z fields.
const ACCEL_OFFSETS: [(usize, usize); 3] = [(0, 1), (2, 3), (4, 5)];
/// (low, high) payload offsets of the angular velocity X/Y/Z fields.
const GYRO_OFFSETS: [(usize, usize); 3] = [(5, 6), (7, 8), (9, 10)];
/// (low, high) payload offsets of the roll/pitch/yaw fields.
const ANGLE_OFFSETS: [(usize, usize); 3] = [(10, 11), (12, 13), (14, 15)];

/// Reinterpret an unsigned wire byte with the sensor's signed-byte convention.
///
/// Values up to 127 are unchanged, 128..=255 map to `value - 256`.
pub fn to_signed(byte: u8) -> i8 {
    byte as i8
}

/// Assemble a signed 16-bit field from its signed low and high bytes.
pub fn assemble(low: i8, high: i8) -> i16 {
    (i16::from(high) << 8) | (i16::from(low) & 0xFF)
}

fn scaled(raw: i16, scale: f64) -> f64 {
    f64::from(raw) / RAW_FULL_SCALE * scale
}

fn group(bytes: &[i8; PAYLOAD_LEN], offsets: &[(usize, usize); 3], scale: f64) -> [f64; 3] {
    offsets.map(|(low, high)| scaled(assemble(bytes[low], bytes[high]), scale))
}

/// Decode the 16-byte sensor payload (header already stripped).
///
/// Bytes past the first 16 are ignored. Shorter payloads are rejected
/// without producing a partial reading.
pub fn decode(payload: &[u8]) -> DecodeResult<Motion> {
    let Some(payload) = payload.get(..PAYLOAD_LEN) else {
        return Err(DecodeError::Truncated {
            needed: PAYLOAD_LEN,
            available: payload.len(),
        });
    };

    let mut signed = [0i8; PAYLOAD_LEN];
    for (dst, &src) in signed.iter_mut().zip(payload) {
        *dst = to_signed(src);
    }

    let [accel_x, accel_y, accel_z] = group(&signed, &ACCEL_OFFSETS, ACCEL_SCALE);
    let [gyro_x, gyro_y, gyro_z] = group(&signed, &GYRO_OFFSETS, GYRO_SCALE);
    let [roll, pitch, yaw] = group(&signed, &ANGLE_OFFSETS, ANGLE_SCALE);

    Ok(Motion {
        accel_x,
        accel_y,
        accel_z,
        gyro_x,
        gyro_y,
        gyro_z,
        roll,
        pitch,
        yaw,
    })
}

/// Decode a complete notification frame, skipping its 2-byte header.
///
/// The header's flag byte is not inspected; every frame is treated as the
/// combined accel/gyro/angle report.
pub fn decode_frame(frame: &[u8]) -> DecodeResult<Motion> {
    if frame.len() < FRAME_LEN {
        return Err(DecodeError::Truncated {
            needed: FRAME_LEN,
            available: frame.len(),
        });
    }

    decode(&frame[FRAME_HEADER_LEN..])
}
