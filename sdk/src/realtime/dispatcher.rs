//! Inbound event routing.
//!
//! Delivery is at-least-once, so the dispatcher filters before fan-out:
//! an event id already seen on the channel is dropped, and an event whose
//! sequence is lower than the last applied one is dropped. Gaps pass.
//!
//! Listeners are invoked in registration order on a snapshot taken before
//! delivery. A listener removed mid-dispatch is skipped; one that panics is
//! logged and does not stop the others.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, trace};

use super::metrics::RealtimeMetrics;
use crate::types::{ChannelName, DropReason, InboundEvent};

/// A registered callback.
pub type Listener = Arc<dyn Fn(&InboundEvent) + Send + Sync>;

/// Identifies a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Outcome of routing one inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Passed the filters; this many listeners returned normally.
    Delivered(usize),
    /// Dropped before fan-out.
    Dropped(DropReason),
}

struct ListenerEntry {
    id: ListenerId,
    event_type: Option<String>,
    callback: Listener,
    active: Arc<AtomicBool>,
}

impl ListenerEntry {
    fn accepts(&self, event_type: &str) -> bool {
        self.event_type
            .as_deref()
            .map_or(true, |wanted| wanted == event_type)
    }
}

/// Bounded memory of recent event ids.
#[derive(Debug, Default)]
struct SeenIds {
    order: VecDeque<String>,
    ids: HashSet<String>,
}

impl SeenIds {
    fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    fn remember(&mut self, id: &str, window: usize) {
        if !self.ids.insert(id.to_string()) {
            return;
        }
        self.order.push_back(id.to_string());
        while self.order.len() > window {
            if let Some(evicted) = self.order.pop_front() {
                self.ids.remove(&evicted);
            }
        }
    }
}

#[derive(Default)]
struct ChannelState {
    listeners: Vec<ListenerEntry>,
    seen: SeenIds,
    last_sequence: Option<u64>,
}

#[derive(Default)]
struct DispatcherState {
    channels: HashMap<ChannelName, ChannelState>,
    index: HashMap<ListenerId, ChannelName>,
}

/// Routes inbound events to channel listeners.
pub struct EventDispatcher {
    state: Mutex<DispatcherState>,
    window: usize,
    next_id: AtomicU64,
    metrics: Arc<RealtimeMetrics>,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("EventDispatcher")
            .field("channels", &state.channels.len())
            .field("listeners", &state.index.len())
            .field("window", &self.window)
            .finish()
    }
}

impl EventDispatcher {
    /// Creates a dispatcher remembering `window` event ids per channel.
    #[must_use]
    pub fn new(window: usize, metrics: Arc<RealtimeMetrics>) -> Self {
        Self {
            state: Mutex::new(DispatcherState::default()),
            window: window.max(1),
            next_id: AtomicU64::new(1),
            metrics,
        }
    }

    /// Registers a listener on a channel, optionally for one event type.
    pub fn listen<F>(
        &self,
        channel: ChannelName,
        event_type: Option<&str>,
        callback: F,
    ) -> ListenerId
    where
        F: Fn(&InboundEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut guard = self.state.lock();
        let state = &mut *guard;

        state
            .channels
            .entry(channel.clone())
            .or_default()
            .listeners
            .push(ListenerEntry {
                id,
                event_type: event_type.map(str::to_string),
                callback: Arc::new(callback),
                active: Arc::new(AtomicBool::new(true)),
            });
        state.index.insert(id, channel);
        id
    }

    /// Removes a listener. Returns false if it was not registered.
    ///
    /// Removing the last listener of a channel discards its dedup and
    /// sequence state.
    pub fn unlisten(&self, id: ListenerId) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let Some(channel) = state.index.remove(&id) else {
            return false;
        };
        let Some(channel_state) = state.channels.get_mut(&channel) else {
            return false;
        };

        if let Some(position) = channel_state.listeners.iter().position(|l| l.id == id) {
            let entry = channel_state.listeners.remove(position);
            entry.active.store(false, Ordering::Release);
        }

        if channel_state.listeners.is_empty() {
            state.channels.remove(&channel);
            debug!(channel = %channel, "last listener removed");
        }
        true
    }

    /// Returns the number of listeners on a channel.
    #[must_use]
    pub fn listener_count(&self, channel: &ChannelName) -> usize {
        self.state
            .lock()
            .channels
            .get(channel)
            .map_or(0, |state| state.listeners.len())
    }

    /// Routes one inbound event.
    pub fn on_inbound(&self, event: &InboundEvent) -> Dispatch {
        self.metrics.record_received();

        let targets = match self.admit(event) {
            Ok(targets) => targets,
            Err(reason) => {
                debug!(
                    channel = %event.channel,
                    event_id = %event.id,
                    sequence = ?event.sequence,
                    %reason,
                    "event dropped"
                );
                self.metrics.record_dropped(reason);
                return Dispatch::Dropped(reason);
            }
        };

        let mut delivered = 0;
        for (id, callback, active) in targets {
            if !active.load(Ordering::Acquire) {
                trace!(listener = %id, "skipping removed listener");
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    self.metrics.record_listener_panic();
                    error!(
                        listener = %id,
                        channel = %event.channel,
                        event_type = %event.event_type,
                        "listener panicked"
                    );
                }
            }
        }

        self.metrics.record_delivered(delivered);
        Dispatch::Delivered(delivered)
    }

    /// Applies the filters and snapshots matching listeners.
    fn admit(
        &self,
        event: &InboundEvent,
    ) -> Result<Vec<(ListenerId, Listener, Arc<AtomicBool>)>, DropReason> {
        let mut state = self.state.lock();
        let channel = state
            .channels
            .get_mut(&event.channel)
            .ok_or(DropReason::NoListeners)?;

        if channel.seen.contains(&event.id) {
            return Err(DropReason::Duplicate);
        }

        if let Some(sequence) = event.sequence {
            if channel.last_sequence.is_some_and(|last| sequence < last) {
                return Err(DropReason::StaleSequence);
            }
            channel.last_sequence = Some(sequence);
        }

        channel.seen.remember(&event.id, self.window);

        Ok(channel
            .listeners
            .iter()
            .filter(|listener| listener.accepts(&event.event_type))
            .map(|listener| {
                (
                    listener.id,
                    Arc::clone(&listener.callback),
                    Arc::clone(&listener.active),
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dispatcher(window: usize) -> Arc<EventDispatcher> {
        Arc::new(EventDispatcher::new(window, Arc::new(RealtimeMetrics::new())))
    }

    fn event(channel: &ChannelName, id: &str, sequence: Option<u64>) -> InboundEvent {
        let event = InboundEvent::new(channel.clone(), "status", json!({})).with_id(id);
        match sequence {
            Some(sequence) => event.with_sequence(sequence),
            None => event,
        }
    }

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&InboundEvent) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |event: &InboundEvent| sink.lock().push(event.id.clone()))
    }

    #[test]
    fn test_delivers_in_registration_order() {
        let dispatcher = dispatcher(200);
        let channel = ChannelName::order("A");
        let order = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let order = Arc::clone(&order);
            dispatcher.listen(channel.clone(), None, move |_| order.lock().push(n));
        }

        assert_eq!(
            dispatcher.on_inbound(&event(&channel, "e1", None)),
            Dispatch::Delivered(3)
        );
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_duplicate_id_delivered_once() {
        let dispatcher = dispatcher(200);
        let channel = ChannelName::order("A");
        let (seen, listener) = recorder();
        dispatcher.listen(channel.clone(), None, listener);

        let first = event(&channel, "e1", Some(1));
        assert_eq!(dispatcher.on_inbound(&first), Dispatch::Delivered(1));
        assert_eq!(
            dispatcher.on_inbound(&first),
            Dispatch::Dropped(DropReason::Duplicate)
        );
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_sequence_regression_dropped_gap_passes() {
        let dispatcher = dispatcher(200);
        let channel = ChannelName::order("A");
        let (seen, listener) = recorder();
        dispatcher.listen(channel.clone(), None, listener);

        dispatcher.on_inbound(&event(&channel, "e5", Some(5)));
        assert_eq!(
            dispatcher.on_inbound(&event(&channel, "e3", Some(3))),
            Dispatch::Dropped(DropReason::StaleSequence)
        );
        assert_eq!(
            dispatcher.on_inbound(&event(&channel, "e9", Some(9))),
            Dispatch::Delivered(1)
        );
        assert_eq!(
            dispatcher.on_inbound(&event(&channel, "e9b", Some(9))),
            Dispatch::Delivered(1)
        );
        assert_eq!(
            dispatcher.on_inbound(&event(&channel, "free", None)),
            Dispatch::Delivered(1)
        );
        assert_eq!(*seen.lock(), vec!["e5", "e9", "e9b", "free"]);
    }

    #[test]
    fn test_out_of_order_sequence_skipped() {
        let dispatcher = dispatcher(200);
        let channel = ChannelName::order("A");
        let (seen, listener) = recorder();
        dispatcher.listen(channel.clone(), None, listener);

        for (id, sequence) in [("s1", 1), ("s3", 3), ("s2", 2), ("s4", 4)] {
            dispatcher.on_inbound(&event(&channel, id, Some(sequence)));
        }
        assert_eq!(*seen.lock(), vec!["s1", "s3", "s4"]);
    }

    #[test]
    fn test_sequences_are_per_channel() {
        let dispatcher = dispatcher(200);
        let a = ChannelName::order("A");
        let b = ChannelName::order("B");
        dispatcher.listen(a.clone(), None, |_| {});
        dispatcher.listen(b.clone(), None, |_| {});

        dispatcher.on_inbound(&event(&a, "a10", Some(10)));
        assert_eq!(
            dispatcher.on_inbound(&event(&b, "b1", Some(1))),
            Dispatch::Delivered(1)
        );
    }

    #[test]
    fn test_dedup_window_is_bounded() {
        let dispatcher = dispatcher(2);
        let channel = ChannelName::order("A");
        dispatcher.listen(channel.clone(), None, |_| {});

        for id in ["e1", "e2", "e3"] {
            dispatcher.on_inbound(&event(&channel, id, None));
        }
        assert_eq!(
            dispatcher.on_inbound(&event(&channel, "e3", None)),
            Dispatch::Dropped(DropReason::Duplicate)
        );
        assert_eq!(
            dispatcher.on_inbound(&event(&channel, "e1", None)),
            Dispatch::Delivered(1)
        );
    }

    #[test]
    fn test_no_listeners() {
        let dispatcher = dispatcher(200);
        assert_eq!(
            dispatcher.on_inbound(&event(&ChannelName::order("A"), "e1", None)),
            Dispatch::Dropped(DropReason::NoListeners)
        );
    }

    #[test]
    fn test_event_type_filter() {
        let dispatcher = dispatcher(200);
        let channel = ChannelName::chat_session("S");
        let (seen, listener) = recorder();
        dispatcher.listen(channel.clone(), Some("message"), listener);

        let typing = InboundEvent::new(channel.clone(), "typing", json!({})).with_id("t1");
        let message = InboundEvent::new(channel.clone(), "message", json!({})).with_id("m1");
        assert_eq!(dispatcher.on_inbound(&typing), Dispatch::Delivered(0));
        assert_eq!(dispatcher.on_inbound(&message), Dispatch::Delivered(1));
        assert_eq!(*seen.lock(), vec!["m1"]);
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let dispatcher = dispatcher(200);
        let channel = ChannelName::order("A");
        let (seen, listener) = recorder();

        dispatcher.listen(channel.clone(), None, |_| panic!("listener bug"));
        dispatcher.listen(channel.clone(), None, listener);

        assert_eq!(
            dispatcher.on_inbound(&event(&channel, "e1", None)),
            Dispatch::Delivered(1)
        );
        assert_eq!(*seen.lock(), vec!["e1"]);
    }

    #[test]
    fn test_listener_removed_during_dispatch_is_skipped() {
        let dispatcher = dispatcher(200);
        let channel = ChannelName::order("A");
        let (seen, listener) = recorder();

        let victim: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));
        let inner = Arc::clone(&dispatcher);
        let slot = Arc::clone(&victim);
        dispatcher.listen(channel.clone(), None, move |_| {
            if let Some(id) = slot.lock().take() {
                inner.unlisten(id);
            }
        });
        let id = dispatcher.listen(channel.clone(), None, listener);
        *victim.lock() = Some(id);

        assert_eq!(
            dispatcher.on_inbound(&event(&channel, "e1", None)),
            Dispatch::Delivered(1)
        );
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_unlisten_last_listener_resets_channel_state() {
        let dispatcher = dispatcher(200);
        let channel = ChannelName::order("A");
        let id = dispatcher.listen(channel.clone(), None, |_| {});
        dispatcher.on_inbound(&event(&channel, "e1", Some(7)));

        assert!(dispatcher.unlisten(id));
        assert!(!dispatcher.unlisten(id));
        assert_eq!(dispatcher.listener_count(&channel), 0);

        dispatcher.listen(channel.clone(), None, |_| {});
        assert_eq!(
            dispatcher.on_inbound(&event(&channel, "e1", Some(1))),
            Dispatch::Delivered(1)
        );
    }
}
