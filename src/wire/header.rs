//! Fixed wire header decode (C1, `spec.md` §4.1, §6).
//!
//! `{seqNum: u16 be, timestamp: u32 be, flags: u16 be}` followed
//! contiguously by the payload. Bit 7 of `flags` is the marker bit; the
//! rest is opaque to the core.

use std::convert::TryInto;

pub const HEADER_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub seq_num: u16,
    pub timestamp: u32,
    pub flags: u16,
}

impl PacketHeader {
    #[inline]
    pub fn marker(&self) -> bool {
        (self.flags >> 7) & 1 != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeError;

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "datagram shorter than the fixed header")
    }
}

impl std::error::Error for DecodeError {}

/// Decodes the fixed header and returns it with the remaining payload
/// slice. Fails (datagram dropped) if `buf.len() < HEADER_SIZE`.
pub fn decode(buf: &[u8]) -> Result<(PacketHeader, &[u8]), DecodeError> {
    if buf.len() < HEADER_SIZE {
        return Err(DecodeError);
    }
    let seq_num = u16::from_be_bytes(buf[0..2].try_into().unwrap());
    let timestamp = u32::from_be_bytes(buf[2..6].try_into().unwrap());
    let flags = u16::from_be_bytes(buf[6..8].try_into().unwrap());
    Ok((
        PacketHeader {
            seq_num,
            timestamp,
            flags,
        },
        &buf[HEADER_SIZE..],
    ))
}

pub fn encode(header: &PacketHeader, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&header.seq_num.to_be_bytes());
    out.extend_from_slice(&header.timestamp.to_be_bytes());
    out.extend_from_slice(&header.flags.to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Converts a 90 kHz RTP timestamp delta to microseconds with unbiased
/// rounding: `(ts90 * 1000 + 45) / 90` (`spec.md` §4.2).
#[inline]
pub fn ts90_to_micros(ts90: u32) -> u64 {
    (u64::from(ts90) * 1000 + 45) / 90
}
