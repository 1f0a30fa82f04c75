//! # layrz-client
//!
//! Transports for the Layrz protocol.
//!
//! This crate provides:
//! - A persistent TCP session with the `Pa`/`As` authentication handshake
//! - Background stream reading with dispatch to a [`PacketHandler`]
//! - A single-shot HTTP transport
//! - Layered configuration (defaults, YAML file, environment)

pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod http;

pub use config::{Config, ConfigError, HttpScheme};
pub use connection::{Connection, ConnectionConfig, ConnectionState};
pub use error::ClientError;
pub use handler::PacketHandler;
pub use http::{HttpClient, HttpConfig};
