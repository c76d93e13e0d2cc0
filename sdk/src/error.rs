//! SDK error types.
//!
//! Connection failures are recovered by the connection manager and only
//! reach whoever awaited `connect()`. Subscription rejections reach the
//! handle that acquired the channel. Invalid transitions are dropped by the
//! consumers, never thrown.

use crate::realtime::TransportError;
use crate::types::{ChannelName, ChannelNameError, InvalidTransitionError};

/// SDK errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SdkError {
    /// A wire name did not match any known variant.
    #[error("unknown {kind}: {value}")]
    UnknownVariant {
        /// What was being parsed.
        kind: &'static str,
        /// The offending value.
        value: String,
    },

    /// An event payload did not have the expected shape.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Malformed channel name.
    #[error(transparent)]
    Channel(#[from] ChannelNameError),

    /// Lifecycle violation.
    #[error(transparent)]
    Transition(#[from] InvalidTransitionError),

    /// Connection failure.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Subscription rejected.
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    /// Transport refused or failed a request.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// The transport could not be reached or the handshake failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// Transport unreachable.
    #[error("transport unreachable: {0}")]
    Unreachable(String),

    /// Handshake or authentication failed.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// `disconnect()` was called while the attempt was in flight.
    #[error("connection attempt aborted by disconnect")]
    Aborted,

    /// The connection manager has shut down.
    #[error("connection manager closed")]
    Closed,
}

/// The server refused a channel subscription.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscriptionError {
    /// The server rejected the subscribe call.
    #[error("subscription to {channel} rejected: {reason}")]
    Rejected {
        /// The rejected channel.
        channel: ChannelName,
        /// Server-provided reason.
        reason: String,
    },

    /// The handle was released before the subscription settled.
    #[error("subscription to {0} released")]
    Released(ChannelName),
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Invalid backoff policy.
    #[error("invalid backoff policy: {0}")]
    InvalidBackoff(&'static str),

    /// Dedup window must hold at least one id.
    #[error("dedup_window must be > 0")]
    InvalidDedupWindow,

    /// Command buffer must be non-empty.
    #[error("command_buffer must be > 0")]
    InvalidCommandBuffer,

    /// Invalid transport URL.
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}
