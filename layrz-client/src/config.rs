//! Client configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via LAYRZ_CONFIG)
//! 3. Environment variables

use crate::connection::{ConnectionConfig, DEFAULT_READ_BUFFER_SIZE};
use crate::http::HttpConfig;
use layrz_protocol::DEFAULT_PORT;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Client configuration.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Device credentials.
    pub device: DeviceConfig,
    /// TCP transport settings.
    pub tcp: TcpConfig,
    /// HTTP transport settings.
    pub http: HttpSettings,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("LAYRZ_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from `lookup`, keyed by environment variable name.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        self.device.apply_overrides(&lookup);
        self.tcp.apply_overrides(&lookup);
        self.http.apply_overrides(&lookup);
    }

    /// Checks that the configuration can open a session.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.ident.is_empty() {
            return Err(ConfigError::ValidationError(
                "device ident not set".to_string(),
            ));
        }
        if self.tcp.host.is_empty() {
            return Err(ConfigError::ValidationError("tcp host not set".to_string()));
        }
        if self.tcp.port == 0 {
            return Err(ConfigError::ValidationError("tcp port is 0".to_string()));
        }
        if self.tcp.auth_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "auth timeout must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds the TCP connection settings.
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig::new(
            self.tcp.host.clone(),
            self.device.ident.clone(),
            self.device.password.clone(),
        )
        .with_port(self.tcp.port)
        .with_connect_timeout(self.tcp.connect_timeout())
        .with_auth_timeout(self.tcp.auth_timeout())
        .with_read_buffer_size(self.tcp.read_buffer_size)
    }

    /// Builds the HTTP transport settings. The HTTP host falls back to the
    /// TCP host when unset.
    pub fn http_config(&self) -> HttpConfig {
        let host = if self.http.host.is_empty() {
            self.tcp.host.clone()
        } else {
            self.http.host.clone()
        };
        HttpConfig::new(
            self.http.scheme,
            host,
            self.device.ident.clone(),
            self.device.password.clone(),
        )
        .with_timeout(Duration::from_secs(self.http.timeout_secs))
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("device", &self.device)
            .field("tcp", &self.tcp)
            .field("http", &self.http)
            .finish()
    }
}

/// Device credentials.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Device identifier, usually the IMEI or MAC address.
    pub ident: String,
    /// Device password.
    pub password: String,
}

impl DeviceConfig {
    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(ident) = lookup("LAYRZ_IDENT") {
            self.ident = ident;
        }
        if let Some(password) = lookup("LAYRZ_PASSWORD") {
            self.password = password;
        }
    }
}

impl fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("ident", &self.ident)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// TCP transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpConfig {
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Seconds to wait for `As` after sending `Pa`.
    pub auth_timeout_secs: u64,
    /// Read buffer size for socket reads.
    pub read_buffer_size: usize,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            connect_timeout_secs: 10,
            auth_timeout_secs: 60,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl TcpConfig {
    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("LAYRZ_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("LAYRZ_PORT") {
            if let Ok(parsed) = port.parse() {
                self.port = parsed;
            }
        }
        if let Some(timeout) = lookup("LAYRZ_CONNECT_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.connect_timeout_secs = secs;
            }
        }
        if let Some(timeout) = lookup("LAYRZ_AUTH_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.auth_timeout_secs = secs;
            }
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }
}

/// URL scheme of the HTTP transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpScheme {
    Http,
    #[default]
    Https,
}

impl fmt::Display for HttpScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpScheme::Http => f.write_str("http"),
            HttpScheme::Https => f.write_str("https"),
        }
    }
}

impl FromStr for HttpScheme {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" => Ok(HttpScheme::Http),
            "https" => Ok(HttpScheme::Https),
            other => Err(ConfigError::ValidationError(format!(
                "unknown http scheme '{}'",
                other
            ))),
        }
    }
}

/// HTTP transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub scheme: HttpScheme,
    /// Server host; empty means the TCP host.
    pub host: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            scheme: HttpScheme::Https,
            host: String::new(),
            timeout_secs: 30,
        }
    }
}

impl HttpSettings {
    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(scheme) = lookup("LAYRZ_HTTP_SCHEME") {
            match scheme.parse() {
                Ok(parsed) => self.scheme = parsed,
                Err(e) => tracing::warn!("Ignoring LAYRZ_HTTP_SCHEME: {}", e),
            }
        }
        if let Some(host) = lookup("LAYRZ_HTTP_HOST") {
            self.host = host;
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
