//! The transport-agnostic event envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::channel::ChannelName;

/// An event pushed by the server on a channel.
///
/// `id` is used for deduplication, `sequence` (if present) for ordering
/// within the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Unique event id.
    pub id: String,

    /// Channel the event was published on.
    pub channel: ChannelName,

    /// Event type, e.g. `status`, `message`, `created`.
    #[serde(rename = "type")]
    pub event_type: String,

    /// Event payload.
    #[serde(default)]
    pub payload: serde_json::Value,

    /// Per-channel sequence number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,

    /// Emission time.
    pub timestamp: DateTime<Utc>,
}

impl InboundEvent {
    /// Creates an event with a fresh id and the current time.
    #[must_use]
    pub fn new(
        channel: ChannelName,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            channel,
            event_type: event_type.into(),
            payload,
            sequence: None,
            timestamp: Utc::now(),
        }
    }

    /// Sets the event id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets the sequence number.
    #[must_use]
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// Returns true if the event has the given type.
    #[must_use]
    pub fn is_type(&self, event_type: &str) -> bool {
        self.event_type == event_type
    }
}

/// Why the dispatcher dropped an inbound event.
///
/// Drops are expected under at-least-once delivery and are not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// The event id was already dispatched on this channel.
    Duplicate,
    /// The sequence number is lower than the last applied one.
    StaleSequence,
    /// Nobody listens on the channel.
    NoListeners,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Duplicate => write!(f, "duplicate"),
            Self::StaleSequence => write!(f, "stale_sequence"),
            Self::NoListeners => write!(f, "no_listeners"),
        }
    }
}
