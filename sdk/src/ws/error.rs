//! WebSocket transport errors.

use std::fmt;

use crate::realtime::TransportError;

/// Errors raised by [`super::WsTransport`] before they are folded into
/// [`TransportError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsError {
    /// The URL is empty or not `ws://`/`wss://`.
    InvalidUrl(String),

    /// A configured interval is zero.
    ZeroInterval(&'static str),

    /// No socket is open.
    NotConnected,

    /// A frame could not be encoded.
    Encode(String),

    /// Writing to the socket failed.
    Write(String),
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUrl(url) => write!(f, "invalid websocket url: {:?}", url),
            Self::ZeroInterval(name) => write!(f, "{} must be greater than zero", name),
            Self::NotConnected => write!(f, "not connected"),
            Self::Encode(msg) => write!(f, "failed to encode frame: {}", msg),
            Self::Write(msg) => write!(f, "socket write failed: {}", msg),
        }
    }
}

impl std::error::Error for WsError {}

impl From<WsError> for TransportError {
    fn from(err: WsError) -> Self {
        match err {
            WsError::NotConnected => Self::NotConnected,
            other => Self::Unavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_error_display() {
        assert_eq!(
            WsError::ZeroInterval("heartbeat_interval").to_string(),
            "heartbeat_interval must be greater than zero"
        );
        assert_eq!(
            WsError::InvalidUrl("http://x".to_string()).to_string(),
            "invalid websocket url: \"http://x\""
        );
    }

    #[test]
    fn test_ws_error_into_transport_error() {
        assert_eq!(
            TransportError::from(WsError::NotConnected),
            TransportError::NotConnected
        );
        assert!(matches!(
            TransportError::from(WsError::Write("broken pipe".to_string())),
            TransportError::Unavailable(_)
        ));
    }
}
