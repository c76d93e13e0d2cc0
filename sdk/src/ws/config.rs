//! WebSocket transport configuration.

use std::time::Duration;

use super::error::WsError;

/// Default relay URL.
pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8080/ws";

/// Default heartbeat interval in seconds.
pub const DEFAULT_HEARTBEAT_SECS: u64 = 30;

/// Default time to wait for a subscribe answer, in seconds.
pub const DEFAULT_SUBSCRIBE_TIMEOUT_SECS: u64 = 10;

/// WebSocket transport configuration.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Relay URL.
    pub url: String,

    /// Heartbeat interval.
    pub heartbeat_interval: Duration,

    /// Time to wait for the server to confirm or refuse a subscribe.
    pub subscribe_timeout: Duration,

    /// Access token sent with subscribes and on the connection URL.
    pub token: Option<String>,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_WS_URL.to_string(),
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
            subscribe_timeout: Duration::from_secs(DEFAULT_SUBSCRIBE_TIMEOUT_SECS),
            token: None,
        }
    }
}

impl WsConfig {
    /// Creates a configuration for the given URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Sets the heartbeat interval.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the subscribe timeout.
    #[must_use]
    pub fn with_subscribe_timeout(mut self, timeout: Duration) -> Self {
        self.subscribe_timeout = timeout;
        self
    }

    /// Sets the access token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Returns the connection URL with the token if set.
    #[must_use]
    pub fn connection_url(&self) -> String {
        match &self.token {
            Some(token) => {
                let separator = if self.url.contains('?') { '&' } else { '?' };
                format!("{}{}token={}", self.url, separator, token)
            }
            None => self.url.clone(),
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), WsError> {
        if !self.url.starts_with("ws://") && !self.url.starts_with("wss://") {
            return Err(WsError::InvalidUrl(self.url.clone()));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(WsError::ZeroInterval("heartbeat_interval"));
        }
        if self.subscribe_timeout.is_zero() {
            return Err(WsError::ZeroInterval("subscribe_timeout"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = WsConfig::default();
        assert_eq!(config.url, DEFAULT_WS_URL);
        assert!(config.token.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = WsConfig::new("wss://shop.example/ws")
            .with_heartbeat_interval(Duration::from_secs(15))
            .with_subscribe_timeout(Duration::from_secs(3))
            .with_token("user:42");

        assert_eq!(config.heartbeat_interval, Duration::from_secs(15));
        assert_eq!(config.subscribe_timeout, Duration::from_secs(3));
        assert_eq!(config.token.as_deref(), Some("user:42"));
    }

    #[test]
    fn test_connection_url() {
        assert_eq!(
            WsConfig::new("wss://shop.example/ws").connection_url(),
            "wss://shop.example/ws"
        );
        assert_eq!(
            WsConfig::new("wss://shop.example/ws")
                .with_token("t")
                .connection_url(),
            "wss://shop.example/ws?token=t"
        );
        assert_eq!(
            WsConfig::new("wss://shop.example/ws?v=2")
                .with_token("t")
                .connection_url(),
            "wss://shop.example/ws?v=2&token=t"
        );
    }

    #[test]
    fn test_config_validate_invalid() {
        assert!(matches!(
            WsConfig::new("").validate(),
            Err(WsError::InvalidUrl(_))
        ));
        assert!(WsConfig::new("https://shop.example/ws").validate().is_err());
        assert_eq!(
            WsConfig::default()
                .with_subscribe_timeout(Duration::ZERO)
                .validate(),
            Err(WsError::ZeroInterval("subscribe_timeout"))
        );
    }
}
