//! Realtime sync layer.
//!
//! - [`ChannelRegistry`]: reference-counted channel interest
//! - [`ConnectionManager`]: connection lifecycle, replay and backoff
//! - [`EventDispatcher`]: dedup, ordering and fan-out of inbound events
//! - [`NotificationBridge`]: inbound events to toasts, sounds and counters
//! - [`RealtimeClient`]: wires them around a [`Transport`]

pub mod backoff;
pub mod bridge;
pub mod client;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod metrics;
pub mod registry;
pub mod subscription;
pub mod transport;

#[cfg(test)]
pub(crate) mod mock;

pub use backoff::{Backoff, BackoffPolicy};
pub use bridge::{
    Counter, Effect, EffectSink, NotificationBridge, SoundCue, StatusBinding, Toast, ToastLevel,
    CREATED_EVENT_TYPE, MESSAGE_EVENT_TYPE,
};
pub use client::RealtimeClient;
pub use config::RealtimeConfig;
pub use connection::{ConnectionManager, ConnectionState, ObserverId, StateObserver};
pub use dispatcher::{Dispatch, EventDispatcher, Listener, ListenerId};
pub use metrics::{MetricsSnapshot, RealtimeMetrics};
pub use registry::{ChannelRegistry, ChannelStatus, SubscriptionHandle};
pub use subscription::Subscription;
pub use transport::{SignalSender, Transport, TransportError, TransportSignal};
