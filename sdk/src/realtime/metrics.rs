//! Client-side realtime counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::types::DropReason;

/// Atomic counters shared by the registry, dispatcher and connection manager.
#[derive(Debug, Default)]
pub struct RealtimeMetrics {
    connect_attempts: AtomicU64,
    connect_failures: AtomicU64,
    sessions_lost: AtomicU64,
    subscribes_sent: AtomicU64,
    unsubscribes_sent: AtomicU64,
    subscriptions_rejected: AtomicU64,
    events_received: AtomicU64,
    events_delivered: AtomicU64,
    duplicates_dropped: AtomicU64,
    stale_dropped: AtomicU64,
    unrouted_dropped: AtomicU64,
    listener_panics: AtomicU64,
    invalid_transitions: AtomicU64,
}

/// Point-in-time copy of [`RealtimeMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Connection attempts started.
    pub connect_attempts: u64,
    /// Connection attempts that failed.
    pub connect_failures: u64,
    /// Established sessions that ended without `disconnect()`.
    pub sessions_lost: u64,
    /// Subscribe calls issued, replays included.
    pub subscribes_sent: u64,
    /// Unsubscribe calls issued.
    pub unsubscribes_sent: u64,
    /// Subscriptions refused by the server.
    pub subscriptions_rejected: u64,
    /// Inbound events seen by the dispatcher.
    pub events_received: u64,
    /// Listener invocations that returned normally.
    pub events_delivered: u64,
    /// Events dropped as duplicates.
    pub duplicates_dropped: u64,
    /// Events dropped for a sequence regression.
    pub stale_dropped: u64,
    /// Events dropped because no listener was registered.
    pub unrouted_dropped: u64,
    /// Listener invocations that panicked.
    pub listener_panics: u64,
    /// Status events ignored as invalid transitions.
    pub invalid_transitions: u64,
}

impl RealtimeMetrics {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_connect_failure(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_session_lost(&self) {
        self.sessions_lost.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_subscribe(&self) {
        self.subscribes_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unsubscribe(&self) {
        self.unsubscribes_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejection(&self) {
        self.subscriptions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self, listeners: usize) {
        self.events_delivered
            .fetch_add(listeners as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self, reason: DropReason) {
        let counter = match reason {
            DropReason::Duplicate => &self.duplicates_dropped,
            DropReason::StaleSequence => &self.stale_dropped,
            DropReason::NoListeners => &self.unrouted_dropped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_listener_panic(&self) {
        self.listener_panics.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_invalid_transition(&self) {
        self.invalid_transitions.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            sessions_lost: self.sessions_lost.load(Ordering::Relaxed),
            subscribes_sent: self.subscribes_sent.load(Ordering::Relaxed),
            unsubscribes_sent: self.unsubscribes_sent.load(Ordering::Relaxed),
            subscriptions_rejected: self.subscriptions_rejected.load(Ordering::Relaxed),
            events_received: self.events_received.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            duplicates_dropped: self.duplicates_dropped.load(Ordering::Relaxed),
            stale_dropped: self.stale_dropped.load(Ordering::Relaxed),
            unrouted_dropped: self.unrouted_dropped.load(Ordering::Relaxed),
            listener_panics: self.listener_panics.load(Ordering::Relaxed),
            invalid_transitions: self.invalid_transitions.load(Ordering::Relaxed),
        }
    }
}
