//! HTTP transport.
//!
//! Every call is a single request: the packet is POSTed to `/v2/message`
//! and the response body is decoded as one server packet. Queued commands
//! are fetched with a GET to `/v2/commands`. No state is kept between calls.

use crate::config::HttpScheme;
use crate::error::ClientError;
use layrz_protocol::{ClientPacket, ServerPacket};
use reqwest::header::AUTHORIZATION;
use std::fmt;
use std::time::Duration;

/// Path packets are posted to.
pub const MESSAGE_PATH: &str = "/v2/message";

/// Path queued commands are fetched from.
pub const COMMANDS_PATH: &str = "/v2/commands";

/// Default request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP transport configuration.
#[derive(Clone)]
pub struct HttpConfig {
    pub scheme: HttpScheme,
    /// Server host, optionally with a port.
    pub host: String,
    pub ident: String,
    pub password: String,
    /// Timeout of a whole request.
    pub timeout: Duration,
}

impl HttpConfig {
    pub fn new(
        scheme: HttpScheme,
        host: impl Into<String>,
        ident: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            scheme,
            host: host.into(),
            ident: ident.into(),
            password: password.into(),
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the full URL of `path` on the configured server.
    pub fn url(&self, path: &str) -> String {
        format!("{}://{}{}", self.scheme, self.host, path)
    }

    /// Value of the `Authorization` header.
    pub fn authorization(&self) -> String {
        format!("LayrzAuth {};{}", self.ident, self.password)
    }
}

impl fmt::Debug for HttpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpConfig")
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("ident", &self.ident)
            .field("password", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Single-shot HTTP client.
pub struct HttpClient {
    config: HttpConfig,
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(config: HttpConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// Posts `packet` and decodes the server's reply.
    pub async fn send(&self, packet: &ClientPacket) -> Result<ServerPacket, ClientError> {
        let url = self.config.url(MESSAGE_PATH);
        tracing::debug!("POST {} <{}>", url, packet.tag());

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, self.config.authorization())
            .body(packet.encode())
            .send()
            .await?;
        Self::decode_response(response).await
    }

    /// Fetches the commands queued for this device.
    pub async fn get_commands(&self) -> Result<ServerPacket, ClientError> {
        let url = self.config.url(COMMANDS_PATH);
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, self.config.authorization())
            .send()
            .await?;
        Self::decode_response(response).await
    }

    async fn decode_response(response: reqwest::Response) -> Result<ServerPacket, ClientError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::debug!("HTTP {} from server", status);
            return Err(ClientError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let packet = ServerPacket::decode(body.trim())?;
        tracing::debug!("Received <{}>", packet.tag());
        Ok(packet)
    }
}
