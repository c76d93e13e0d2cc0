//! Notification bridge.
//!
//! Maps inbound events to user-facing effects: toasts, sounds and badge
//! counters. Status events are validated against their lifecycle first; an
//! invalid or already-applied transition produces no effect at all.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::dispatcher::EventDispatcher;
use super::metrics::RealtimeMetrics;
use super::registry::ChannelRegistry;
use super::subscription::Subscription;
use crate::types::{
    Applied, ChannelName, InboundEvent, Lifecycle, OrderStatus, StatusPayload, VerificationRequest,
    VerificationStatus, VerificationUpdate, STATUS_EVENT_TYPE, VERIFICATION_EVENT_TYPE,
};

/// Event type of a chat message.
pub const MESSAGE_EVENT_TYPE: &str = "message";

/// Event type of a newly placed order on the admin feed.
pub const CREATED_EVENT_TYPE: &str = "created";

/// Toast severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToastLevel {
    /// Neutral information.
    Info,
    /// Something completed.
    Success,
    /// Needs attention.
    Warning,
    /// Something failed.
    Error,
}

/// A transient message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toast {
    /// Severity.
    pub level: ToastLevel,
    /// Heading.
    pub title: String,
    /// Body text.
    pub message: String,
}

/// Sound cues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundCue {
    /// Generic notification chime.
    Notification,
    /// New order on the admin feed.
    NewOrder,
    /// Incoming chat message.
    Message,
}

/// Badge counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Counter {
    /// Unread chat messages.
    UnreadMessages,
    /// Orders not yet seen by an admin.
    NewOrders,
}

/// A user-facing side effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Effect {
    /// Show a toast.
    Toast(Toast),
    /// Play a sound.
    Sound {
        /// Which sound.
        cue: SoundCue,
    },
    /// Adjust a badge counter.
    Counter {
        /// Which counter.
        counter: Counter,
        /// Amount to add.
        delta: i64,
    },
}

impl Effect {
    fn toast(level: ToastLevel, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Toast(Toast {
            level,
            title: title.into(),
            message: message.into(),
        })
    }

    const fn sound(cue: SoundCue) -> Self {
        Self::Sound { cue }
    }

    const fn increment(counter: Counter) -> Self {
        Self::Counter { counter, delta: 1 }
    }
}

/// Receives effects produced by the bridge.
pub trait EffectSink: Send + Sync + 'static {
    /// Handles one effect.
    fn emit(&self, effect: Effect);
}

impl EffectSink for mpsc::UnboundedSender<Effect> {
    fn emit(&self, effect: Effect) {
        if self.send(effect).is_err() {
            trace!("effect receiver dropped");
        }
    }
}

/// A status binding: the subscription plus the locally cached state it
/// keeps current.
#[derive(Debug)]
pub struct StatusBinding<T> {
    subscription: Subscription,
    current: Arc<Mutex<T>>,
}

impl<T: Clone> StatusBinding<T> {
    /// Returns the cached state.
    #[must_use]
    pub fn current(&self) -> T {
        self.current.lock().clone()
    }

    /// Returns the underlying subscription.
    #[must_use]
    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// Returns the underlying subscription mutably.
    pub fn subscription_mut(&mut self) -> &mut Subscription {
        &mut self.subscription
    }
}

/// Binds channels to effects.
pub struct NotificationBridge {
    registry: Arc<ChannelRegistry>,
    dispatcher: Arc<EventDispatcher>,
    sink: Arc<dyn EffectSink>,
    metrics: Arc<RealtimeMetrics>,
}

impl fmt::Debug for NotificationBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationBridge").finish_non_exhaustive()
    }
}

impl NotificationBridge {
    pub(crate) fn new(
        registry: Arc<ChannelRegistry>,
        dispatcher: Arc<EventDispatcher>,
        sink: Arc<dyn EffectSink>,
        metrics: Arc<RealtimeMetrics>,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            sink,
            metrics,
        }
    }

    /// Binds an event type on a channel to a handler producing effects.
    pub fn bind<F>(&self, channel: ChannelName, event_type: &str, handler: F) -> Subscription
    where
        F: Fn(&InboundEvent) -> Vec<Effect> + Send + Sync + 'static,
    {
        let handle = self.registry.acquire(channel.clone());
        let sink = Arc::clone(&self.sink);
        let listener = self.dispatcher.listen(channel, Some(event_type), move |event| {
            for effect in handler(event) {
                sink.emit(effect);
            }
        });
        Subscription::new(handle, listener, &self.dispatcher)
    }

    /// Tracks an order's status, starting from the cached value.
    ///
    /// Each real change emits a toast with the status label and a chime.
    pub fn bind_order_status(
        &self,
        order_id: &str,
        cached: OrderStatus,
    ) -> StatusBinding<OrderStatus> {
        let current = Arc::new(Mutex::new(cached));
        let state = Arc::clone(&current);
        let metrics = Arc::clone(&self.metrics);
        let order_id = order_id.to_string();

        let subscription = self.bind(
            ChannelName::order(&order_id),
            STATUS_EVENT_TYPE,
            move |event| {
                let payload = match StatusPayload::<OrderStatus>::from_value(&event.payload) {
                    Ok(payload) => payload,
                    Err(error) => {
                        warn!(order_id = %order_id, %error, "ignoring malformed status event");
                        return Vec::new();
                    }
                };

                let mut status = state.lock();
                match status.advance_to(payload.status) {
                    Ok(Applied::Changed(next)) => {
                        let from = *status;
                        debug!(order_id = %order_id, %from, to = %next, "order status changed");
                        *status = next;
                        order_status_effects(&order_id, next)
                    }
                    Ok(Applied::Unchanged) => Vec::new(),
                    Err(error) => {
                        metrics.record_invalid_transition();
                        warn!(order_id = %order_id, %error, "ignoring order status event");
                        Vec::new()
                    }
                }
            },
        );

        StatusBinding {
            subscription,
            current,
        }
    }

    /// Tracks a user's identity verification on their notification channel.
    pub fn bind_verification(
        &self,
        cached: VerificationRequest,
    ) -> StatusBinding<VerificationRequest> {
        let channel = ChannelName::user_notifications(&cached.user_id);
        let current = Arc::new(Mutex::new(cached));
        let state = Arc::clone(&current);
        let metrics = Arc::clone(&self.metrics);

        let subscription = self.bind(channel, VERIFICATION_EVENT_TYPE, move |event| {
            let update: VerificationUpdate = match serde_json::from_value(event.payload.clone()) {
                Ok(update) => update,
                Err(error) => {
                    warn!(%error, "ignoring malformed verification event");
                    return Vec::new();
                }
            };

            let mut request = state.lock();
            match request.apply_update(&update) {
                Ok(Applied::Changed(next)) => verification_effects(next, request.reason.as_deref()),
                Ok(Applied::Unchanged) => Vec::new(),
                Err(error) => {
                    metrics.record_invalid_transition();
                    warn!(request_id = %update.request_id, %error, "ignoring verification event");
                    Vec::new()
                }
            }
        });

        StatusBinding {
            subscription,
            current,
        }
    }

    /// Chimes and bumps the unread counter for each chat message not sent
    /// by `viewer_id`.
    pub fn bind_chat(&self, session_id: &str, viewer_id: &str) -> Subscription {
        let viewer_id = viewer_id.to_string();
        self.bind(
            ChannelName::chat_session(session_id),
            MESSAGE_EVENT_TYPE,
            move |event| {
                let sender = event.payload.get("sender_id").and_then(|v| v.as_str());
                if sender == Some(viewer_id.as_str()) {
                    return Vec::new();
                }
                vec![
                    Effect::sound(SoundCue::Message),
                    Effect::increment(Counter::UnreadMessages),
                ]
            },
        )
    }

    /// Announces newly placed orders on the admin feed.
    pub fn bind_admin_orders(&self) -> Subscription {
        self.bind(ChannelName::admin_orders(), CREATED_EVENT_TYPE, |event| {
            let message = event
                .payload
                .get("order_id")
                .and_then(|v| v.as_str())
                .map_or_else(|| "Neue Bestellung eingegangen".to_string(), |id| {
                    format!("Bestellung {id}")
                });
            vec![
                Effect::toast(ToastLevel::Info, "Neue Bestellung", message),
                Effect::sound(SoundCue::NewOrder),
                Effect::increment(Counter::NewOrders),
            ]
        })
    }
}

fn order_status_effects(order_id: &str, status: OrderStatus) -> Vec<Effect> {
    let level = match status {
        OrderStatus::Cancelled => ToastLevel::Warning,
        OrderStatus::Shipped | OrderStatus::Completed => ToastLevel::Success,
        _ => ToastLevel::Info,
    };
    vec![
        Effect::toast(level, format!("Bestellung {order_id}"), status.label()),
        Effect::sound(SoundCue::Notification),
    ]
}

fn verification_effects(status: VerificationStatus, reason: Option<&str>) -> Vec<Effect> {
    let (level, message) = match (status, reason) {
        (VerificationStatus::Verified, _) => (ToastLevel::Success, status.label().to_string()),
        (VerificationStatus::Rejected, Some(reason)) => {
            (ToastLevel::Error, format!("{}: {reason}", status.label()))
        }
        (VerificationStatus::Rejected, None) => (ToastLevel::Error, status.label().to_string()),
        _ => (ToastLevel::Info, status.label().to_string()),
    };
    vec![
        Effect::toast(level, "Verifizierung", message),
        Effect::sound(SoundCue::Notification),
    ]
}
