//! Per-connection state.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use storefront_realtime_sdk::types::ChannelName;
use storefront_realtime_sdk::ws::ServerMessage;
use tokio::sync::mpsc;

use crate::auth::Principal;

/// Global connection ID counter.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generates a unique connection ID.
#[must_use]
pub fn next_connection_id() -> u64 {
    CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// One WebSocket client.
#[derive(Debug)]
pub struct Connection {
    id: u64,
    principal: Principal,
    subscriptions: HashSet<ChannelName>,
    sender: mpsc::Sender<ServerMessage>,
}

impl Connection {
    /// Creates a connection for an authenticated principal.
    #[must_use]
    pub fn new(principal: Principal, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id: next_connection_id(),
            principal,
            subscriptions: HashSet::new(),
            sender,
        }
    }

    /// Returns the connection ID.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Returns the principal resolved at upgrade time.
    #[must_use]
    pub const fn principal(&self) -> &Principal {
        &self.principal
    }

    /// Returns the outbound queue.
    #[must_use]
    pub fn sender(&self) -> mpsc::Sender<ServerMessage> {
        self.sender.clone()
    }

    /// Records a subscription. Returns false if it already existed.
    pub fn subscribe(&mut self, channel: ChannelName) -> bool {
        self.subscriptions.insert(channel)
    }

    /// Removes a subscription. Returns false if there was none.
    pub fn unsubscribe(&mut self, channel: &ChannelName) -> bool {
        self.subscriptions.remove(channel)
    }

    /// Returns true if subscribed to the channel.
    #[must_use]
    pub fn is_subscribed(&self, channel: &ChannelName) -> bool {
        self.subscriptions.contains(channel)
    }

    /// Returns the number of subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Queues a frame for this connection.
    ///
    /// Returns true if the frame was queued.
    pub async fn send(&self, message: ServerMessage) -> bool {
        self.sender.send(message).await.is_ok()
    }
}
