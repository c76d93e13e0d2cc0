//! Relay server configuration.

use std::env;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Default bind host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default bind port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default outbound buffer per WebSocket connection.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Errors produced while loading the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServerConfigError {
    /// `REALTIME_PORT` is not a valid port number.
    #[error("invalid port: {0}")]
    InvalidPort(String),

    /// The host and port do not form a socket address.
    #[error("invalid bind address: {0}")]
    InvalidAddress(String),

    /// The connection buffer is zero.
    #[error("channel buffer must be greater than zero")]
    InvalidChannelBuffer,
}

/// Relay server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,

    /// Bind port.
    pub port: u16,

    /// Token that grants admin access. Admin channels are closed when unset.
    #[serde(default, skip_serializing)]
    pub admin_token: Option<String>,

    /// Outbound frame buffer per connection.
    pub channel_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl ServerConfig {
    /// Creates a configuration for the given host and port.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            admin_token: None,
            channel_buffer: DEFAULT_CHANNEL_BUFFER,
        }
    }

    /// Loads the configuration from `REALTIME_HOST`, `REALTIME_PORT` and
    /// `REALTIME_ADMIN_TOKEN`, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if `REALTIME_PORT` is set but not a port number.
    pub fn from_env() -> Result<Self, ServerConfigError> {
        let host = env::var("REALTIME_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        let port = match env::var("REALTIME_PORT") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| ServerConfigError::InvalidPort(raw))?,
            Err(_) => DEFAULT_PORT,
        };

        let mut config = Self::new(host, port);
        config.admin_token = env::var("REALTIME_ADMIN_TOKEN")
            .ok()
            .filter(|token| !token.is_empty());
        Ok(config)
    }

    /// Sets the admin token.
    #[must_use]
    pub fn with_admin_token(mut self, token: impl Into<String>) -> Self {
        self.admin_token = Some(token.into());
        self
    }

    /// Sets the per-connection outbound buffer.
    #[must_use]
    pub fn with_channel_buffer(mut self, size: usize) -> Self {
        self.channel_buffer = size;
        self
    }

    /// Returns the socket address to bind.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not parse as an address.
    pub fn addr(&self) -> Result<SocketAddr, ServerConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| ServerConfigError::InvalidAddress(format!("{}:{}", self.host, self.port)))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ServerConfigError> {
        if self.channel_buffer == 0 {
            return Err(ServerConfigError::InvalidChannelBuffer);
        }
        self.addr().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.admin_token.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = ServerConfig::new("127.0.0.1", 9000)
            .with_admin_token("secret")
            .with_channel_buffer(16);

        assert_eq!(config.admin_token.as_deref(), Some("secret"));
        assert_eq!(config.channel_buffer, 16);
        assert_eq!(config.addr().map(|a| a.port()), Ok(9000));
    }

    #[test]
    fn test_config_validate_invalid() {
        assert_eq!(
            ServerConfig::default().with_channel_buffer(0).validate(),
            Err(ServerConfigError::InvalidChannelBuffer)
        );
        assert!(matches!(
            ServerConfig::new("not a host", 80).validate(),
            Err(ServerConfigError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_admin_token_not_serialized() {
        let config = ServerConfig::default().with_admin_token("secret");
        let json = serde_json::to_string(&config).expect("serialize");
        assert!(!json.contains("secret"));
    }
}
