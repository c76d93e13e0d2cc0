//! Storefront realtime SDK - client library for live storefront updates.
//!
//! Keeps shopper and admin views in sync with server-side changes: order
//! status, identity verification, chat and the admin order feed.
//!
//! # Core Types
//!
//! - [`ChannelName`] - `entity:id[:sub]` channel names
//! - [`InboundEvent`] - the event envelope
//! - [`OrderStatus`], [`VerificationStatus`] - lifecycle state machines
//!
//! # Realtime
//!
//! - [`RealtimeClient`] - registry, dispatcher and connection manager
//!   wired around a [`Transport`]
//! - [`NotificationBridge`] - turns events into toasts, sounds and counters
//! - [`WsTransport`] - WebSocket transport
//!
//! # Example
//!
//! ```rust
//! use storefront_realtime_sdk::{ChannelName, Lifecycle, OrderEvent, OrderStatus};
//!
//! let channel = ChannelName::order("1042");
//! assert_eq!(channel.as_str(), "order:1042");
//!
//! let status = OrderStatus::Pending.transition(OrderEvent::MarkConfirmed);
//! assert_eq!(status, Ok(OrderStatus::Confirmed));
//! ```

pub mod error;
pub mod realtime;
pub mod types;
pub mod ws;

pub use error::{ConfigError, ConnectionError, SdkError, SubscriptionError};
pub use realtime::{
    ChannelRegistry, ConnectionState, Effect, EffectSink, EventDispatcher, NotificationBridge,
    RealtimeClient, RealtimeConfig, Subscription, SubscriptionHandle, Transport,
};
pub use types::{
    Applied, ChannelName, InboundEvent, InvalidTransitionError, Lifecycle, OrderEvent, OrderStatus,
    VerificationEvent, VerificationRequest, VerificationStatus,
};
pub use ws::WsTransport;
