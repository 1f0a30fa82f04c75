//! # layrz-protocol
//!
//! Wire protocol implementation for the Layrz telemetry protocol.
//!
//! This crate provides:
//! - CRC-16/X-25 checksums rendered as 4 uppercase hex digits
//! - `<Tag>body</Tag>` envelope sealing and verification
//! - The argument map sub-codec with semantic key rewriting
//! - One encoder/decoder per packet tag, device→server and server→device
//! - A stream decoder that recovers envelopes from fragmented reads

pub mod args;
pub mod checksum;
pub mod codec;
pub mod envelope;
pub mod error;
pub mod packet;

pub use args::{ArgValue, ArgumentMap};
pub use checksum::{checksum, checksum_hex};
pub use codec::{Decoder, Encoder};
pub use error::ProtocolError;
pub use packet::{ClientPacket, Packet, PacketBody, ServerPacket, Tag};

/// Default TCP port of the Layrz ingestion server.
pub const DEFAULT_PORT: u16 = 5000;

/// Maximum size of a single buffered envelope (1 MiB).
pub const MAX_ENVELOPE_SIZE: usize = 1024 * 1024;

/// Line terminator appended after every packet written to a stream.
pub const LINE_TERMINATOR: &str = "\r\n";
