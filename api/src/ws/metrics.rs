//! Relay metrics.
//!
//! Atomic counters for connections, subscriptions and published events.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

/// Counters for the relay.
#[derive(Debug)]
pub struct RelayMetrics {
    connections_opened: AtomicU64,
    connections_closed: AtomicU64,
    frames_received: AtomicU64,
    frames_sent: AtomicU64,
    frames_dropped: AtomicU64,
    malformed_frames: AtomicU64,
    subscriptions: AtomicU64,
    subscriptions_rejected: AtomicU64,
    unsubscriptions: AtomicU64,
    events_published: AtomicU64,
    events_fanned_out: AtomicU64,
    publishes_rejected: AtomicU64,
    duplicates_suppressed: AtomicU64,
    start_time: Instant,
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayMetrics {
    /// Creates a new metrics instance.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections_opened: AtomicU64::new(0),
            connections_closed: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            malformed_frames: AtomicU64::new(0),
            subscriptions: AtomicU64::new(0),
            subscriptions_rejected: AtomicU64::new(0),
            unsubscriptions: AtomicU64::new(0),
            events_published: AtomicU64::new(0),
            events_fanned_out: AtomicU64::new(0),
            publishes_rejected: AtomicU64::new(0),
            duplicates_suppressed: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Records a connection opened.
    pub fn record_connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a connection closed.
    pub fn record_connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a frame received from a client.
    pub fn record_frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a frame written to a client.
    pub fn record_frame_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Records frames dropped because a client buffer was full or closed.
    pub fn record_frames_dropped(&self, count: usize) {
        self.frames_dropped
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Records a frame that did not parse.
    pub fn record_malformed_frame(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a subscription.
    pub fn record_subscription(&self) {
        self.subscriptions.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a refused subscription.
    pub fn record_subscription_rejected(&self) {
        self.subscriptions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an unsubscription.
    pub fn record_unsubscription(&self) {
        self.unsubscriptions.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a published event and how many connections it reached.
    pub fn record_published(&self, recipients: usize) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
        self.events_fanned_out
            .fetch_add(recipients as u64, Ordering::Relaxed);
    }

    /// Records a refused publish.
    pub fn record_publish_rejected(&self) {
        self.publishes_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a status publish suppressed as already applied.
    pub fn record_duplicate_suppressed(&self) {
        self.duplicates_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the current active connections.
    #[must_use]
    pub fn active_connections(&self) -> u64 {
        self.connections_opened
            .load(Ordering::Relaxed)
            .saturating_sub(self.connections_closed.load(Ordering::Relaxed))
    }

    /// Returns a snapshot of all metrics.
    #[must_use]
    pub fn snapshot(&self) -> RelayMetricsSnapshot {
        RelayMetricsSnapshot {
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            active_connections: self.active_connections(),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
            subscriptions: self.subscriptions.load(Ordering::Relaxed),
            subscriptions_rejected: self.subscriptions_rejected.load(Ordering::Relaxed),
            unsubscriptions: self.unsubscriptions.load(Ordering::Relaxed),
            events_published: self.events_published.load(Ordering::Relaxed),
            events_fanned_out: self.events_fanned_out.load(Ordering::Relaxed),
            publishes_rejected: self.publishes_rejected.load(Ordering::Relaxed),
            duplicates_suppressed: self.duplicates_suppressed.load(Ordering::Relaxed),
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }
}

/// A point-in-time snapshot of relay metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayMetricsSnapshot {
    /// Total connections opened.
    pub connections_opened: u64,
    /// Total connections closed.
    pub connections_closed: u64,
    /// Active connections.
    pub active_connections: u64,
    /// Frames received.
    pub frames_received: u64,
    /// Frames sent.
    pub frames_sent: u64,
    /// Frames dropped on full or closed client buffers.
    pub frames_dropped: u64,
    /// Frames that did not parse.
    pub malformed_frames: u64,
    /// Subscriptions accepted.
    pub subscriptions: u64,
    /// Subscriptions refused.
    pub subscriptions_rejected: u64,
    /// Unsubscriptions.
    pub unsubscriptions: u64,
    /// Events published.
    pub events_published: u64,
    /// Event frames queued to subscribers.
    pub events_fanned_out: u64,
    /// Publishes refused by access rules or lifecycle validation.
    pub publishes_rejected: u64,
    /// Status publishes suppressed as already applied.
    pub duplicates_suppressed: u64,
    /// Seconds since start.
    pub uptime_secs: u64,
}
