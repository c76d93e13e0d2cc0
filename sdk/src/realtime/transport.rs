//! Transport abstraction.
//!
//! The realtime core never talks to a socket directly. Any transport that
//! can `subscribe`, `unsubscribe` and `publish` on named channels and push
//! inbound signals back can drive it: WebSocket, SSE, or a message broker.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::error::ConnectionError;
use crate::types::{ChannelName, InboundEvent};

/// Sender half handed to a transport on connect.
pub type SignalSender = mpsc::Sender<TransportSignal>;

/// Signals pushed by a transport into the connection manager.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportSignal {
    /// An event arrived on a subscribed channel.
    Event(InboundEvent),

    /// The server revoked or refused a channel outside a subscribe call.
    Rejected {
        /// Affected channel.
        channel: ChannelName,
        /// Server-provided reason.
        reason: String,
    },

    /// The connection is gone.
    Closed {
        /// Why it closed.
        reason: String,
    },
}

/// Errors returned by transport verbs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The transport is not connected.
    #[error("transport not connected")]
    NotConnected,

    /// The underlying connection failed.
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    /// The server did not answer in time.
    #[error("transport timed out")]
    Timeout,

    /// The server refused the request.
    #[error("{channel} rejected: {reason}")]
    Rejected {
        /// Affected channel.
        channel: ChannelName,
        /// Server-provided reason.
        reason: String,
    },
}

impl TransportError {
    /// Returns true if the error means the connection is unusable.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }
}

/// A realtime transport.
///
/// `subscribe` resolves once the server has accepted or refused the
/// subscription; a refusal is reported as [`TransportError::Rejected`].
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Opens the connection. Inbound signals must be sent on `signals`
    /// until the connection ends; dropping the sender ends the session.
    async fn connect(&self, signals: SignalSender) -> Result<(), ConnectionError>;

    /// Tears the connection down.
    async fn disconnect(&self);

    /// Subscribes to a channel.
    async fn subscribe(&self, channel: &ChannelName) -> Result<(), TransportError>;

    /// Unsubscribes from a channel.
    async fn unsubscribe(&self, channel: &ChannelName) -> Result<(), TransportError>;

    /// Publishes an event on a channel.
    async fn publish(
        &self,
        channel: &ChannelName,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<(), TransportError>;
}

/// Work queued for the session driver.
#[derive(Debug)]
pub(crate) enum Command {
    Subscribe(ChannelName),
    Unsubscribe(ChannelName),
    Publish {
        channel: ChannelName,
        event_type: String,
        payload: serde_json::Value,
        reply: oneshot::Sender<Result<(), TransportError>>,
    },
}

/// A command stamped with the connection epoch it was issued in.
///
/// The driver discards commands from earlier epochs; replay after a
/// reconnect already covers them.
#[derive(Debug)]
pub(crate) struct Outbound {
    pub(crate) epoch: u64,
    pub(crate) command: Command,
}

pub(crate) type CommandSender = mpsc::UnboundedSender<Outbound>;
pub(crate) type CommandReceiver = mpsc::UnboundedReceiver<Outbound>;
