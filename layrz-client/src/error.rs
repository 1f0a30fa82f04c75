//! Client error types.

use std::time::Duration;
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] layrz_protocol::ProtocolError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("not connected")]
    NotConnected,

    #[error("already connected")]
    AlreadyConnected,

    #[error("connect timeout")]
    ConnectTimeout,

    #[error("authentication timeout after {waited:?}")]
    AuthTimeout { waited: Duration },

    #[error("connection closed")]
    ConnectionClosed,
}

impl ClientError {
    /// Returns whether the caller may retry the failed operation.
    ///
    /// Nothing is retried internally.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Io(_) => true,
            ClientError::ConnectTimeout => true,
            ClientError::AuthTimeout { .. } => true,
            ClientError::ConnectionClosed => true,
            ClientError::Http(e) => e.is_timeout() || e.is_connect(),
            ClientError::HttpStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
