//! Stream encoder and decoder for Layrz envelopes.
//!
//! TCP delivers packets with arbitrary fragmentation and coalescing. The
//! [`Decoder`] accumulates bytes and yields one complete `<Xy>...</Xy>`
//! envelope at a time; anything between envelopes (line terminators, noise)
//! is discarded. An opening tag whose close never arrives before the next
//! opening tag is dropped so the stream resynchronises on the next envelope.

use crate::error::ProtocolError;
use crate::packet::{ClientPacket, Direction, Packet, ServerPacket};
use crate::{LINE_TERMINATOR, MAX_ENVELOPE_SIZE};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Length of an opening tag, `<Xy>`.
const OPEN_TAG_LEN: usize = 4;
/// Length of a closing tag, `</Xy>`.
const CLOSE_TAG_LEN: usize = 5;

/// Encodes packets for a byte stream.
pub struct Encoder;

impl Encoder {
    /// Encodes a device→server packet followed by the line terminator.
    pub fn encode_client(packet: &ClientPacket) -> BytesMut {
        Self::encode_line(&packet.encode())
    }

    /// Encodes a server→device packet followed by the line terminator.
    pub fn encode_server(packet: &ServerPacket) -> BytesMut {
        Self::encode_line(&packet.encode())
    }

    fn encode_line(raw: &str) -> BytesMut {
        let mut buf = BytesMut::with_capacity(raw.len() + LINE_TERMINATOR.len());
        buf.put_slice(raw.as_bytes());
        buf.put_slice(LINE_TERMINATOR.as_bytes());
        buf
    }
}

/// Recovers envelopes from a fragmented byte stream.
pub struct Decoder {
    buffer: BytesMut,
    max_envelope_size: usize,
    /// Accepted first letters of opening tags; `None` accepts any letter.
    leads: Option<&'static [u8]>,
}

impl Decoder {
    pub fn new() -> Self {
        Self::with_max_envelope_size(MAX_ENVELOPE_SIZE)
    }

    /// Creates a decoder that rejects envelopes larger than `max` bytes.
    pub fn with_max_envelope_size(max: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
            max_envelope_size: max,
            leads: None,
        }
    }

    /// Only recognises envelopes travelling in `direction`.
    ///
    /// Tags of the other direction are treated as noise between envelopes.
    pub fn for_direction(mut self, direction: Direction) -> Self {
        self.leads = Some(direction.tag_leads());
        self
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Appends bytes to the internal buffer.
    pub fn extend_bytes(&mut self, data: Bytes) {
        self.buffer.extend_from_slice(&data);
    }

    /// Extracts the next complete envelope from the buffer.
    ///
    /// Returns `Ok(None)` when more data is needed. A trailing partial
    /// envelope stays buffered for the next call. An opening tag followed by
    /// another opening tag before its own close is dropped with
    /// [`ProtocolError::Unterminated`]. When the pending envelope outgrows the
    /// size limit the buffer is dropped and [`ProtocolError::EnvelopeTooLarge`]
    /// is returned.
    pub fn decode_envelope(&mut self) -> Result<Option<String>, ProtocolError> {
        loop {
            match self.buffer.iter().position(|&b| b == b'<') {
                Some(start) => self.buffer.advance(start),
                None => {
                    self.buffer.clear();
                    return Ok(None);
                }
            }

            if self.buffer.len() < OPEN_TAG_LEN {
                return Ok(None);
            }

            if !self.is_open_tag(&self.buffer[..OPEN_TAG_LEN]) {
                self.buffer.advance(1);
                continue;
            }

            let mut close = [0u8; CLOSE_TAG_LEN];
            close[..2].copy_from_slice(b"</");
            close[2..4].copy_from_slice(&self.buffer[1..3]);
            close[4] = b'>';

            let found = self.buffer[OPEN_TAG_LEN..]
                .windows(CLOSE_TAG_LEN)
                .position(|window| window == close)
                .map(|pos| OPEN_TAG_LEN + pos);
            let next_open = self.buffer[1..]
                .windows(OPEN_TAG_LEN)
                .position(|window| self.is_open_tag(window))
                .map(|pos| 1 + pos);

            if let Some(next) = next_open {
                if found.map_or(true, |close_at| next < close_at) {
                    let tag = String::from_utf8_lossy(&self.buffer[1..3]).into_owned();
                    self.buffer.advance(next);
                    return Err(ProtocolError::Unterminated(tag));
                }
            }

            return match found {
                Some(close_at) => {
                    let end = close_at + CLOSE_TAG_LEN;
                    if end > self.max_envelope_size {
                        self.buffer.advance(end);
                        return Err(self.too_large(end));
                    }
                    let envelope = self.buffer.split_to(end);
                    String::from_utf8(envelope.to_vec())
                        .map(Some)
                        .map_err(|_| ProtocolError::InvalidUtf8)
                }
                None if self.buffer.len() > self.max_envelope_size => {
                    let size = self.buffer.len();
                    self.buffer.clear();
                    Err(self.too_large(size))
                }
                None => Ok(None),
            };
        }
    }

    /// Extracts and decodes the next packet of either direction.
    pub fn decode_packet(&mut self) -> Result<Option<Packet>, ProtocolError> {
        match self.decode_envelope()? {
            Some(raw) => Packet::decode(&raw).map(Some),
            None => Ok(None),
        }
    }

    /// Extracts and decodes the next server→device packet.
    pub fn decode_server_packet(&mut self) -> Result<Option<ServerPacket>, ProtocolError> {
        match self.decode_envelope()? {
            Some(raw) => ServerPacket::decode(&raw).map(Some),
            None => Ok(None),
        }
    }

    /// Extracts and decodes the next device→server packet.
    pub fn decode_client_packet(&mut self) -> Result<Option<ClientPacket>, ProtocolError> {
        match self.decode_envelope()? {
            Some(raw) => ClientPacket::decode(&raw).map(Some),
            None => Ok(None),
        }
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    fn is_open_tag(&self, bytes: &[u8]) -> bool {
        is_open_tag(bytes) && self.leads.map_or(true, |leads| leads.contains(&bytes[1]))
    }

    fn too_large(&self, size: usize) -> ProtocolError {
        ProtocolError::EnvelopeTooLarge {
            size,
            max: self.max_envelope_size,
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

fn is_open_tag(bytes: &[u8]) -> bool {
    bytes[0] == b'<'
        && bytes[1].is_ascii_alphabetic()
        && bytes[2].is_ascii_alphabetic()
        && bytes[3] == b'>'
}
