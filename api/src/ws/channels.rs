//! Channel subscriptions and fan-out.
//!
//! Tracks which connections listen on which channel, stamps published
//! events with an id, a per-channel sequence and a timestamp, and queues
//! them to every subscriber.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use storefront_realtime_sdk::types::{ChannelName, InboundEvent};
use storefront_realtime_sdk::ws::ServerMessage;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

/// Result of a fan-out.
#[derive(Debug, Clone, PartialEq)]
pub struct Fanout {
    /// The stamped event.
    pub event: InboundEvent,
    /// Connections the event was queued to.
    pub delivered: usize,
    /// Subscribers whose buffer was full or closed.
    pub dropped: usize,
}

/// Manages channel subscriptions for all connections.
#[derive(Debug, Default)]
pub struct ChannelManager {
    /// Channel -> set of connection IDs.
    subscriptions: Arc<RwLock<HashMap<ChannelName, HashSet<u64>>>>,

    /// Connection ID -> outbound frame queue.
    senders: Arc<RwLock<HashMap<u64, mpsc::Sender<ServerMessage>>>>,

    /// Last sequence stamped per channel.
    sequences: Mutex<HashMap<ChannelName, u64>>,
}

impl ChannelManager {
    /// Creates a new channel manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the outbound queue of a connection.
    pub async fn register(&self, connection_id: u64, sender: mpsc::Sender<ServerMessage>) {
        self.senders.write().await.insert(connection_id, sender);
    }

    /// Removes a connection and all its subscriptions.
    pub async fn unregister(&self, connection_id: u64) {
        self.senders.write().await.remove(&connection_id);
        self.unsubscribe_all(connection_id).await;
    }

    /// Subscribes a connection to a channel.
    pub async fn subscribe(&self, channel: ChannelName, connection_id: u64) {
        let mut subs = self.subscriptions.write().await;
        subs.entry(channel).or_default().insert(connection_id);
    }

    /// Unsubscribes a connection from a channel.
    pub async fn unsubscribe(&self, channel: &ChannelName, connection_id: u64) {
        let mut subs = self.subscriptions.write().await;
        if let Some(ids) = subs.get_mut(channel) {
            ids.remove(&connection_id);
            if ids.is_empty() {
                subs.remove(channel);
            }
        }
    }

    /// Unsubscribes a connection from all channels.
    pub async fn unsubscribe_all(&self, connection_id: u64) {
        let mut subs = self.subscriptions.write().await;
        subs.retain(|_, ids| {
            ids.remove(&connection_id);
            !ids.is_empty()
        });
    }

    /// Returns the connection IDs subscribed to a channel.
    pub async fn subscribers(&self, channel: &ChannelName) -> Vec<u64> {
        let subs = self.subscriptions.read().await;
        subs.get(channel)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Returns the number of subscribers for a channel.
    pub async fn subscriber_count(&self, channel: &ChannelName) -> usize {
        let subs = self.subscriptions.read().await;
        subs.get(channel).map_or(0, HashSet::len)
    }

    /// Returns the total number of subscriptions.
    pub async fn total_subscriptions(&self) -> usize {
        let subs = self.subscriptions.read().await;
        subs.values().map(HashSet::len).sum()
    }

    /// Returns the last sequence stamped on a channel.
    #[must_use]
    pub fn last_sequence(&self, channel: &ChannelName) -> Option<u64> {
        self.sequences.lock().get(channel).copied()
    }

    /// Stamps an event and queues it to every subscriber of its channel.
    ///
    /// Subscribers with a full or closed queue miss the event; they are
    /// expected to resync through replay on reconnect.
    pub async fn publish(
        &self,
        channel: ChannelName,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Fanout {
        let subs = self.subscriptions.read().await;
        let senders = self.senders.read().await;

        let event = {
            let mut sequences = self.sequences.lock();
            let sequence = sequences.entry(channel.clone()).or_insert(0);
            *sequence += 1;

            InboundEvent::new(channel, event_type, payload).with_sequence(*sequence)
        };

        let mut delivered = 0;
        let mut dropped = 0;
        for id in subs.get(&event.channel).into_iter().flatten() {
            let Some(sender) = senders.get(id) else {
                continue;
            };
            match sender.try_send(ServerMessage::Event {
                event: event.clone(),
            }) {
                Ok(()) => delivered += 1,
                Err(error) => {
                    warn!(connection_id = id, channel = %event.channel, %error, "subscriber missed event");
                    dropped += 1;
                }
            }
        }

        debug!(
            channel = %event.channel,
            event_type = %event.event_type,
            sequence = ?event.sequence,
            delivered,
            "event published"
        );

        Fanout {
            event,
            delivered,
            dropped,
        }
    }
}
