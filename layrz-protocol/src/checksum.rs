//! Packet checksum.
//!
//! Layrz packets are sealed with CRC-16/X-25 (reflected 0x1021, init and
//! xorout 0xFFFF), rendered as exactly four uppercase hex digits.

use crate::error::ProtocolError;
use crc::{Crc, CRC_16_IBM_SDLC};

const X25: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_SDLC);

/// Number of characters in a rendered checksum token.
pub const CHECKSUM_LEN: usize = 4;

/// Computes the checksum of `data`.
pub fn checksum(data: &[u8]) -> u16 {
    X25.checksum(data)
}

/// Computes the checksum of `data` and renders it as 4 uppercase hex digits.
pub fn checksum_hex(data: &[u8]) -> String {
    format!("{:04X}", checksum(data))
}

/// Parses a received checksum token.
pub fn parse_checksum(token: &str) -> Result<u16, ProtocolError> {
    if token.len() != CHECKSUM_LEN || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ProtocolError::InvalidChecksum(token.to_string()));
    }
    u16::from_str_radix(token, 16).map_err(|_| ProtocolError::InvalidChecksum(token.to_string()))
}

/// Verifies that `token` is the checksum of `content`.
pub fn verify(content: &[u8], token: &str) -> Result<(), ProtocolError> {
    let received = parse_checksum(token)?;
    let computed = checksum(content);
    if received != computed {
        return Err(ProtocolError::ChecksumMismatch { received, computed });
    }
    Ok(())
}
