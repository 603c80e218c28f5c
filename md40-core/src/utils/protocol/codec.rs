//! Little-endian encoding of the values the MD40 exchanges.
//!
//! The peripheral stores every multi-byte value least-significant byte first.
//! These helpers pin that order down regardless of the host's endianness.

/// Scale between a PID gain and its wire integer.
pub const GAIN_SCALE: f32 = 100.0;

pub const fn encode_u16(value: u16) -> [u8; 2] {
    value.to_le_bytes()
}

pub const fn encode_i16(value: i16) -> [u8; 2] {
    value.to_le_bytes()
}

pub const fn encode_i32(value: i32) -> [u8; 4] {
    value.to_le_bytes()
}

pub const fn decode_i16(bytes: [u8; 2]) -> i16 {
    i16::from_le_bytes(bytes)
}

pub const fn decode_i32(bytes: [u8; 4]) -> i32 {
    i32::from_le_bytes(bytes)
}

/// Convert a gain to its fixed-point wire value.
///
/// Multiplies by [`GAIN_SCALE`] and truncates toward zero. Values outside the
/// `i16` range saturate.
pub fn gain_to_wire(value: f32) -> i16 {
    (value * GAIN_SCALE) as i16
}

/// Convert a fixed-point wire value back to a gain.
pub fn gain_from_wire(raw: i16) -> f32 {
    raw as f32 / GAIN_SCALE
}
