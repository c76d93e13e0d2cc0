//! Realtime client facade.
//!
//! Wires one registry, one dispatcher and one connection manager around a
//! transport. Share a single client per process; components acquire
//! channels and listen through it.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use super::bridge::{EffectSink, NotificationBridge};
use super::config::RealtimeConfig;
use super::connection::{ConnectionManager, ConnectionState, ObserverId};
use super::dispatcher::EventDispatcher;
use super::metrics::{MetricsSnapshot, RealtimeMetrics};
use super::registry::{ChannelRegistry, SubscriptionHandle};
use super::subscription::Subscription;
use super::transport::Transport;
use crate::error::{ConfigError, ConnectionError, SdkError};
use crate::types::{ChannelName, InboundEvent};

/// Realtime client.
#[derive(Debug)]
pub struct RealtimeClient {
    registry: Arc<ChannelRegistry>,
    dispatcher: Arc<EventDispatcher>,
    connection: ConnectionManager,
    metrics: Arc<RealtimeMetrics>,
}

impl RealtimeClient {
    /// Creates a client over a transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(transport: Arc<dyn Transport>, config: RealtimeConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let metrics = Arc::new(RealtimeMetrics::new());
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let registry = ChannelRegistry::new(commands_tx, Arc::clone(&metrics));
        let dispatcher = Arc::new(EventDispatcher::new(
            config.dedup_window,
            Arc::clone(&metrics),
        ));
        let connection = ConnectionManager::new(
            transport,
            Arc::clone(&registry),
            Arc::clone(&dispatcher),
            commands_rx,
            config,
            Arc::clone(&metrics),
        );

        info!("realtime client created");
        Ok(Self {
            registry,
            dispatcher,
            connection,
            metrics,
        })
    }

    /// Creates a client with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_defaults(transport: Arc<dyn Transport>) -> Result<Self, ConfigError> {
        Self::new(transport, RealtimeConfig::default())
    }

    /// Connects. See [`ConnectionManager::connect`].
    ///
    /// # Errors
    ///
    /// Returns the error of the observed attempt.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        self.connection.connect().await
    }

    /// Disconnects and stops reconnecting.
    pub fn disconnect(&self) {
        self.connection.disconnect();
    }

    /// Returns the connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Registers a connection state observer.
    pub fn on_state_change<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        self.connection.on_state_change(observer)
    }

    /// Declares interest in a channel without listening.
    pub fn acquire(&self, channel: ChannelName) -> SubscriptionHandle {
        self.registry.acquire(channel)
    }

    /// Acquires a channel and listens on it, optionally for one event type.
    pub fn subscribe<F>(
        &self,
        channel: ChannelName,
        event_type: Option<&str>,
        listener: F,
    ) -> Subscription
    where
        F: Fn(&InboundEvent) + Send + Sync + 'static,
    {
        let handle = self.registry.acquire(channel.clone());
        let id = self.dispatcher.listen(channel, event_type, listener);
        Subscription::new(handle, id, &self.dispatcher)
    }

    /// Publishes an event on the live connection.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Transport`] if not connected or refused.
    pub async fn publish(
        &self,
        channel: ChannelName,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<(), SdkError> {
        self.connection
            .publish(channel, event_type, payload)
            .await
            .map_err(SdkError::from)
    }

    /// Creates a notification bridge emitting into `sink`.
    pub fn bridge(&self, sink: impl EffectSink) -> NotificationBridge {
        NotificationBridge::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.dispatcher),
            Arc::new(sink),
            Arc::clone(&self.metrics),
        )
    }

    /// Returns the channel registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    /// Returns the event dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    /// Returns the connection manager.
    #[must_use]
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Returns a snapshot of the client counters.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use parking_lot::Mutex;
    use serde_json::json;
    use tokio_test::assert_ok;

    use crate::realtime::backoff::BackoffPolicy;
    use crate::realtime::bridge::{Effect, Toast};
    use crate::realtime::mock::{wait_until, Call, MockTransport};
    use crate::types::{OrderStatus, STATUS_EVENT_TYPE};

    fn client(transport: &Arc<MockTransport>) -> RealtimeClient {
        let config = RealtimeConfig::default().with_backoff(
            BackoffPolicy::default()
                .with_base_delay(Duration::from_millis(50))
                .with_jitter(0.0),
        );
        RealtimeClient::new(Arc::clone(transport) as Arc<dyn Transport>, config)
            .expect("valid config")
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[test]
    fn test_invalid_config_rejected() {
        let transport = MockTransport::new();
        let result = RealtimeClient::new(
            transport as Arc<dyn Transport>,
            RealtimeConfig::default().with_dedup_window(0),
        );
        assert!(matches!(result, Err(ConfigError::InvalidDedupWindow)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_channel_single_transport_subscription() {
        let transport = MockTransport::new();
        let client = client(&transport);
        let channel = ChannelName::order("A");

        let first = client.subscribe(channel.clone(), None, |_| {});
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let second = client.subscribe(channel.clone(), None, move |event| {
            sink.lock().push(event.id.clone());
        });

        client.connect().await.expect("connect");
        assert!(wait_until(|| transport.subscribes().len() == 1).await);
        assert_eq!(transport.subscribes(), vec!["order:A"]);

        drop(first);
        settle().await;
        assert_eq!(transport.count(&Call::Unsubscribe("order:A".to_string())), 0);

        transport
            .push(InboundEvent::new(channel.clone(), STATUS_EVENT_TYPE, json!({})).with_id("after-drop"))
            .await;
        assert!(wait_until(|| received.lock().len() == 1).await);
        assert_eq!(*received.lock(), vec!["after-drop"]);

        drop(second);
        assert!(wait_until(|| transport.count(&Call::Unsubscribe("order:A".to_string())) == 1).await);
        assert_eq!(transport.subscribes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_replays_and_dedups_redelivery() {
        let transport = MockTransport::new();
        let client = client(&transport);
        let received = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&received);
        let _order = client.subscribe(ChannelName::order("A"), None, move |event| {
            sink.lock().push(event.id.clone());
        });
        let _admin = client.subscribe(ChannelName::admin_orders(), None, |_| {});

        client.connect().await.expect("connect");
        let seen = InboundEvent::new(ChannelName::order("A"), STATUS_EVENT_TYPE, json!({}))
            .with_id("evt-1")
            .with_sequence(1);
        transport.push(seen.clone()).await;
        assert!(wait_until(|| received.lock().len() == 1).await);

        transport.clear_calls();
        transport.drop_connection().await;
        assert!(wait_until(|| transport.subscribes().len() == 2).await);
        assert!(client.state().is_connected());
        assert_eq!(transport.subscribes(), vec!["admin:orders", "order:A"]);

        transport.push(seen).await;
        settle().await;
        assert_eq!(*received.lock(), vec!["evt-1"]);
        assert_eq!(client.metrics().duplicates_dropped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bridge_ignores_invalid_transition_from_server() {
        let transport = MockTransport::new();
        let client = client(&transport);
        let (sink, mut effects) = mpsc::unbounded_channel();
        let bridge = client.bridge(sink);

        let binding = bridge.bind_order_status("A", OrderStatus::Completed);
        client.connect().await.expect("connect");

        transport
            .push(InboundEvent::new(
                ChannelName::order("A"),
                STATUS_EVENT_TYPE,
                json!({ "status": "shipped" }),
            ))
            .await;
        settle().await;

        assert!(effects.try_recv().is_err());
        assert_eq!(binding.current(), OrderStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bridge_toasts_once_for_redelivered_status() {
        let transport = MockTransport::new();
        let client = client(&transport);
        let (sink, mut effects) = mpsc::unbounded_channel();
        let bridge = client.bridge(sink);

        let _binding = bridge.bind_order_status("A", OrderStatus::Pending);
        client.connect().await.expect("connect");

        let confirmed = InboundEvent::new(
            ChannelName::order("A"),
            STATUS_EVENT_TYPE,
            json!({ "status": "confirmed", "previous": "pending" }),
        );
        transport.push(confirmed.clone()).await;
        transport.push(confirmed).await;
        settle().await;

        let mut toasts = Vec::new();
        while let Ok(effect) = effects.try_recv() {
            if let Effect::Toast(Toast { message, .. }) = effect {
                toasts.push(message);
            }
        }
        assert_eq!(toasts, vec!["Bestätigt"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_through_client() {
        let transport = MockTransport::new();
        let client = client(&transport);

        assert!(matches!(
            client
                .publish(ChannelName::chat_session("S"), "message", json!({ "body": "Hallo" }))
                .await,
            Err(SdkError::Transport(_))
        ));

        assert_ok!(client.connect().await);
        assert_ok!(
            client
                .publish(ChannelName::chat_session("S"), "message", json!({ "body": "Hallo" }))
                .await
        );
        assert_eq!(
            transport.count(&Call::Publish(
                "chat:session:S".to_string(),
                "message".to_string()
            )),
            1
        );
    }
}
