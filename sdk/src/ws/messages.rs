//! WebSocket wire frames.
//!
//! JSON text frames tagged by `type`. Shared by the client transport and
//! the relay server.

use serde::{Deserialize, Serialize};

use crate::types::{ChannelName, InboundEvent};

/// Error code: the frame could not be parsed.
pub const INVALID_MESSAGE: &str = "INVALID_MESSAGE";

/// Error code: the connection may not subscribe to the channel.
pub const SUBSCRIBE_REJECTED: &str = "SUBSCRIBE_REJECTED";

/// Error code: the connection may not publish to the channel.
pub const PUBLISH_REJECTED: &str = "PUBLISH_REJECTED";

/// Error code: the status event is not a valid lifecycle transition.
pub const INVALID_TRANSITION: &str = "INVALID_TRANSITION";

/// Client-to-server frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Subscribe to a channel.
    Subscribe {
        /// Channel to subscribe to.
        channel: ChannelName,
        /// Access token for protected channels.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },
    /// Unsubscribe from a channel.
    Unsubscribe {
        /// Channel to unsubscribe from.
        channel: ChannelName,
    },
    /// Publish an event.
    Publish {
        /// Target channel.
        channel: ChannelName,
        /// Event type.
        event_type: String,
        /// Event payload.
        #[serde(default)]
        payload: serde_json::Value,
    },
    /// Heartbeat.
    Ping {
        /// Timestamp in milliseconds.
        timestamp: u64,
    },
}

/// Server-to-client frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Subscription confirmed.
    Subscribed {
        /// Channel subscribed to.
        channel: ChannelName,
    },
    /// Unsubscription confirmed.
    Unsubscribed {
        /// Channel unsubscribed from.
        channel: ChannelName,
    },
    /// An event on a subscribed channel.
    Event {
        /// The stamped event.
        event: InboundEvent,
    },
    /// Error response.
    Error {
        /// Error code.
        code: String,
        /// Error message.
        message: String,
        /// Channel the error refers to.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel: Option<ChannelName>,
    },
    /// Heartbeat response.
    Pong {
        /// Echoed timestamp.
        timestamp: u64,
    },
}

impl ServerMessage {
    /// Creates an error frame.
    #[must_use]
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
            channel: None,
        }
    }

    /// Creates an error frame about a channel.
    #[must_use]
    pub fn channel_error(
        code: impl Into<String>,
        message: impl Into<String>,
        channel: ChannelName,
    ) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
            channel: Some(channel),
        }
    }

    /// Returns the channel the frame refers to, if any.
    #[must_use]
    pub fn channel(&self) -> Option<&ChannelName> {
        match self {
            Self::Subscribed { channel } | Self::Unsubscribed { channel } => Some(channel),
            Self::Event { event } => Some(&event.channel),
            Self::Error { channel, .. } => channel.as_ref(),
            Self::Pong { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_subscribe_wire_format() {
        let msg = ClientMessage::Subscribe {
            channel: ChannelName::order("A"),
            token: None,
        };
        let json = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(json, json!({ "type": "subscribe", "channel": "order:A" }));
    }

    #[test]
    fn test_client_publish_parse() {
        let raw = r#"{"type":"publish","channel":"order:A","event_type":"status","payload":{"status":"confirmed"}}"#;
        let msg: ClientMessage = serde_json::from_str(raw).expect("deserialize");
        match msg {
            ClientMessage::Publish {
                channel,
                event_type,
                payload,
            } => {
                assert_eq!(channel, ChannelName::order("A"));
                assert_eq!(event_type, "status");
                assert_eq!(payload["status"], "confirmed");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_channel_rejected() {
        let raw = r#"{"type":"subscribe","channel":"nocolon"}"#;
        assert!(serde_json::from_str::<ClientMessage>(raw).is_err());
    }

    #[test]
    fn test_server_event_parse() {
        let raw = r#"{
            "type": "event",
            "event": {
                "id": "evt-1",
                "channel": "admin:orders",
                "type": "created",
                "payload": {"order_id": "1042"},
                "sequence": 7,
                "timestamp": "2024-05-01T12:00:00Z"
            }
        }"#;
        let msg: ServerMessage = serde_json::from_str(raw).expect("deserialize");
        assert_eq!(msg.channel(), Some(&ChannelName::admin_orders()));
        match msg {
            ServerMessage::Event { event } => {
                assert_eq!(event.id, "evt-1");
                assert_eq!(event.event_type, "created");
                assert_eq!(event.sequence, Some(7));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_server_error_with_channel() {
        let msg = ServerMessage::channel_error(
            SUBSCRIBE_REJECTED,
            "unauthorized",
            ChannelName::admin_orders(),
        );
        let json = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(json["code"], SUBSCRIBE_REJECTED);
        assert_eq!(json["channel"], "admin:orders");

        let plain = serde_json::to_value(ServerMessage::error(INVALID_MESSAGE, "bad json"))
            .expect("serialize");
        assert!(plain.get("channel").is_none());
    }
}
