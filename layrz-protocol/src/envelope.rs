//! Envelope grammar.
//!
//! Every packet travels as `<Tag>content CRC</Tag>` where `content` is the
//! `;`-terminated field list and `CRC` is the checksum of `content`:
//!
//! ```text
//! <Pi>744DBD89B0D9;layrz.hub12.base;49;22246;1;460;0;false;2586</Pi>
//!     |<------------------- content -------------------->|CRC |
//! ```
//!
//! Degenerate envelopes carry no fields and their content is a bare `;`.

use crate::checksum::{self, CHECKSUM_LEN};
use crate::error::ProtocolError;
use crate::packet::Tag;

/// Field separator inside an envelope body.
pub const FIELD_SEPARATOR: char = ';';

/// Wraps `content` (which must end with `;`) and appends its checksum.
pub fn seal(tag: Tag, content: &str) -> String {
    let tag = tag.as_str();
    let crc = checksum::checksum_hex(content.as_bytes());
    format!("<{tag}>{content}{crc}</{tag}>")
}

/// Returns the checksummed block `content` + CRC, without any tags.
///
/// Used for nested blocks (BLE advertisements, queued commands) that carry
/// their own checksum inside a larger envelope.
pub fn seal_block(content: &str) -> String {
    format!("{}{}", content, checksum::checksum_hex(content.as_bytes()))
}

/// Strips the tags of a `tag` envelope, verifies the checksum and returns the
/// content with its trailing separator removed.
///
/// The checksum is verified before any field is looked at.
pub fn open(raw: &str, tag: Tag) -> Result<&str, ProtocolError> {
    let expected = tag.as_str();
    let body = raw
        .strip_prefix('<')
        .and_then(|s| s.strip_prefix(expected))
        .and_then(|s| s.strip_prefix('>'))
        .and_then(|s| s.strip_suffix('>'))
        .and_then(|s| s.strip_suffix(expected))
        .and_then(|s| s.strip_suffix("</"))
        .ok_or(ProtocolError::InvalidTag { expected })?;

    open_block(body)
}

/// Verifies a `content` + CRC block and returns the content without its
/// trailing separator.
pub fn open_block(block: &str) -> Result<&str, ProtocolError> {
    if block.len() < CHECKSUM_LEN || !block.is_char_boundary(block.len() - CHECKSUM_LEN) {
        return Err(ProtocolError::InvalidChecksum(block.to_string()));
    }

    let (content, token) = block.split_at(block.len() - CHECKSUM_LEN);
    checksum::verify(content.as_bytes(), token)?;

    content
        .strip_suffix(FIELD_SEPARATOR)
        .ok_or(ProtocolError::MissingSeparator)
}

/// Reads the tag of an envelope (`<Xy>...`) without validating the rest.
pub fn peek_tag(raw: &str) -> Option<&str> {
    let bytes = raw.as_bytes();
    if bytes.len() >= 4 && bytes[0] == b'<' && bytes[3] == b'>' {
        let tag = &raw[1..3];
        if tag.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Some(tag);
        }
    }
    None
}

/// Splits verified content into exactly `expected` fields.
pub fn fields(content: &str, tag: Tag, expected: usize) -> Result<Vec<&str>, ProtocolError> {
    let parts: Vec<&str> = content.split(FIELD_SEPARATOR).collect();
    if parts.len() != expected {
        return Err(ProtocolError::TokenCount {
            tag: tag.as_str(),
            expected,
            actual: parts.len(),
        });
    }
    Ok(parts)
}
