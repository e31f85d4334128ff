//! Frame checksum for telemetry packets.
//!
//! The checksum is a CRC-16 in the CCITT family: polynomial `0x1021`,
//! initial register `0xFFFF`, MSB-first, no reflection and no final XOR.
//!
//! # Byte stream
//!
//! Only three packet fields are covered, always in this order and always
//! little-endian:
//!
//! ```text
//! ┌──────────────┬─────────────┬────────────────┐
//! │ payload f64  │ counter u32 │ timestamp f64  │
//! │   8 bytes    │   4 bytes   │    8 bytes     │
//! └──────────────┴─────────────┴────────────────┘
//! ```
//!
//! The counter is fixed at 32 bits. Widening it would change the byte
//! stream and therefore every checksum, so the width is part of the
//! wire contract. The sync marker is never part of the input.

/// CCITT generator polynomial.
pub const CRC16_POLY: u16 = 0x1021;

/// Register value before the first byte is processed.
pub const CRC16_INIT: u16 = 0xFFFF;

/// Number of bytes fed to the CRC for one packet.
pub const FRAME_INPUT_LEN: usize = 8 + 4 + 8;

/// Computes the frame checksum over `{payload, counter, timestamp}`.
///
/// Pure and deterministic: the same three values always produce the same
/// checksum. Works on a stack buffer, so nothing is allocated per call.
///
/// ```rust
/// use telesim_protocol::checksum;
///
/// assert_eq!(checksum(0.0, 0, 0.0), 0xF6B8);
/// ```
pub fn checksum(payload: f64, counter: u32, timestamp: f64) -> u16 {
    crc16_ccitt(&frame_bytes(payload, counter, timestamp))
}

/// Serializes the checksummed fields into their fixed 20-byte layout.
pub fn frame_bytes(payload: f64, counter: u32, timestamp: f64) -> [u8; FRAME_INPUT_LEN] {
    let mut buf = [0u8; FRAME_INPUT_LEN];
    buf[0..8].copy_from_slice(&payload.to_le_bytes());
    buf[8..12].copy_from_slice(&counter.to_le_bytes());
    buf[12..20].copy_from_slice(&timestamp.to_le_bytes());
    buf
}

/// Runs the CRC register over an arbitrary byte slice.
pub fn crc16_ccitt(bytes: &[u8]) -> u16 {
    let mut crc = CRC16_INIT;
    for &byte in bytes {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ CRC16_POLY
            } else {
                crc << 1
            };
        }
    }
    crc
}
