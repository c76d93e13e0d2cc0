//! Shared relay state.

use std::sync::Arc;

use storefront_realtime_sdk::types::{ChannelName, InboundEvent};
use tracing::{debug, info};

use crate::auth::{AccessPolicy, Principal};
use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::gate::{Admission, TransitionGate};
use crate::ws::{ChannelManager, RelayMetrics};

/// State shared by HTTP handlers and WebSocket connections.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Channel subscriptions and fan-out.
    pub channels: Arc<ChannelManager>,
    /// Lifecycle validation.
    pub gate: Arc<TransitionGate>,
    /// Access rules.
    pub policy: Arc<AccessPolicy>,
    /// Counters.
    pub metrics: Arc<RelayMetrics>,
    /// Outbound frame buffer per connection.
    pub channel_buffer: usize,
    publish_lock: Arc<tokio::sync::Mutex<()>>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(&ServerConfig::default())
    }
}

impl AppState {
    /// Creates the state for a server configuration.
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            channels: Arc::new(ChannelManager::new()),
            gate: Arc::new(TransitionGate::new()),
            policy: Arc::new(AccessPolicy::new(config.admin_token.clone())),
            metrics: Arc::new(RelayMetrics::new()),
            channel_buffer: config.channel_buffer,
            publish_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Validates and fans out an event.
    ///
    /// Returns `None` when the event reports a state the entity is already
    /// in; nothing is published then.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::PublishForbidden`] if `principal` may not publish
    /// on the channel, or the gate's error if the payload or transition is
    /// invalid.
    pub async fn publish(
        &self,
        principal: &Principal,
        channel: ChannelName,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<Option<InboundEvent>, ApiError> {
        if !self.policy.can_publish(principal, &channel) {
            self.metrics.record_publish_rejected();
            return Err(ApiError::PublishForbidden(channel.to_string()));
        }

        // gate order and sequence order must agree
        let _guard = self.publish_lock.lock().await;

        let payload = match self.gate.admit(&channel, event_type, payload) {
            Ok(Admission::Accept(payload)) => payload,
            Ok(Admission::Duplicate) => {
                debug!(channel = %channel, event_type, "suppressing repeated status");
                self.metrics.record_duplicate_suppressed();
                return Ok(None);
            }
            Err(error) => {
                self.metrics.record_publish_rejected();
                return Err(error);
            }
        };

        let fanout = self.channels.publish(channel, event_type, payload).await;
        self.metrics.record_published(fanout.delivered);
        self.metrics.record_frames_dropped(fanout.dropped);

        info!(
            channel = %fanout.event.channel,
            event_type,
            id = %fanout.event.id,
            recipients = fanout.delivered,
            "event relayed"
        );
        Ok(Some(fanout.event))
    }
}
