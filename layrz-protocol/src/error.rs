//! Protocol error types.

use thiserror::Error;

/// Errors produced while decoding (or framing) Layrz packets.
///
/// Every variant is fatal to the single decode that produced it and never to
/// the connection carrying the packet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("invalid envelope, should be <{expected}>...</{expected}>")]
    InvalidTag { expected: &'static str },

    #[error("unknown packet tag: {0:?}")]
    UnknownTag(String),

    #[error("invalid <{tag}> packet, should contain {expected} parts, got {actual}")]
    TokenCount {
        tag: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("cannot convert {field} {value:?}")]
    InvalidField { field: &'static str, value: String },

    #[error("missing field separator before checksum")]
    MissingSeparator,

    #[error("cannot convert CRC {0:?} to integer")]
    InvalidChecksum(String),

    #[error("invalid CRC, received: {received:04X}, calculated: {computed:04X}")]
    ChecksumMismatch { received: u16, computed: u16 },

    #[error("unterminated <{0}> envelope, skipped to the next opening tag")]
    Unterminated(String),

    #[error("envelope too large: {size} bytes (max {max})")]
    EnvelopeTooLarge { size: usize, max: usize },

    #[error("invalid UTF-8 in envelope")]
    InvalidUtf8,
}

impl ProtocolError {
    /// Returns whether the error is an integrity failure rather than a framing one.
    pub fn is_checksum_error(&self) -> bool {
        matches!(
            self,
            ProtocolError::ChecksumMismatch { .. } | ProtocolError::InvalidChecksum(_)
        )
    }

    pub(crate) fn invalid_field(field: &'static str, value: impl Into<String>) -> Self {
        ProtocolError::InvalidField {
            field,
            value: value.into(),
        }
    }
}
