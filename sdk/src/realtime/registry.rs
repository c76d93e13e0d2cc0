//! Reference-counted channel registry.
//!
//! Many components can want the same channel at once. The registry keeps a
//! count per channel, issues `subscribe` on the 0→1 edge and `unsubscribe`
//! on the 1→0 edge, and remembers every wanted channel so the connection
//! manager can replay it after a reconnect.
//!
//! Commands are queued to the session driver stamped with the connection
//! epoch, under the same lock that guards the counts, so a channel never
//! has more than one subscribe outstanding for a live connection.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::metrics::RealtimeMetrics;
use super::transport::{Command, CommandSender, Outbound};
use crate::error::SubscriptionError;
use crate::types::ChannelName;

/// Server-side state of a wanted channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    /// Waiting for a connection or for the server to answer.
    Pending,
    /// Subscribed on the live connection.
    Active,
    /// Refused by the server. Not replayed until released and re-acquired.
    Failed(SubscriptionError),
}

#[derive(Debug)]
struct ChannelEntry {
    count: usize,
    /// A subscribe was issued on the current connection.
    subscribed: bool,
    status: watch::Sender<ChannelStatus>,
}

impl ChannelEntry {
    fn new() -> Self {
        let (status, _) = watch::channel(ChannelStatus::Pending);
        Self {
            count: 0,
            subscribed: false,
            status,
        }
    }

    fn is_failed(&self) -> bool {
        matches!(*self.status.borrow(), ChannelStatus::Failed(_))
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    channels: HashMap<ChannelName, ChannelEntry>,
    handles: HashMap<u64, ChannelName>,
    connected: bool,
    epoch: u64,
    next_handle: u64,
}

/// A freshly established connection and the channels to replay on it.
#[derive(Debug)]
pub(crate) struct Session {
    pub(crate) epoch: u64,
    pub(crate) replay: Vec<ChannelName>,
}

/// Reference-counted set of wanted channels.
#[derive(Debug)]
pub struct ChannelRegistry {
    state: Mutex<RegistryState>,
    commands: CommandSender,
    metrics: Arc<RealtimeMetrics>,
}

impl ChannelRegistry {
    pub(crate) fn new(commands: CommandSender, metrics: Arc<RealtimeMetrics>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(RegistryState::default()),
            commands,
            metrics,
        })
    }

    /// Declares interest in a channel.
    ///
    /// The first holder of a channel triggers a `subscribe` if connected;
    /// otherwise the channel is subscribed when the connection comes up.
    /// Dropping the returned handle releases the interest.
    pub fn acquire(self: &Arc<Self>, channel: ChannelName) -> SubscriptionHandle {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let id = state.next_handle;
        state.next_handle += 1;

        let entry = state
            .channels
            .entry(channel.clone())
            .or_insert_with(ChannelEntry::new);
        entry.count += 1;

        if entry.count == 1 {
            if state.connected {
                entry.subscribed = true;
                self.enqueue(state.epoch, Command::Subscribe(channel.clone()));
            } else {
                debug!(channel = %channel, "channel pending until connected");
            }
        }

        let status = entry.status.subscribe();
        state.handles.insert(id, channel.clone());

        debug!(channel = %channel, count = entry.count, "channel acquired");

        SubscriptionHandle {
            id,
            channel,
            status,
            registry: Arc::downgrade(self),
        }
    }

    /// Releases a handle. Equivalent to dropping it.
    pub fn release(&self, handle: SubscriptionHandle) {
        drop(handle);
    }

    fn release_id(&self, id: u64) {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let Some(channel) = state.handles.remove(&id) else {
            warn!(handle = id, "release of unknown subscription handle");
            return;
        };

        let Some(entry) = state.channels.get_mut(&channel) else {
            warn!(channel = %channel, "release of untracked channel");
            return;
        };

        entry.count = entry.count.saturating_sub(1);
        debug!(channel = %channel, count = entry.count, "channel released");

        if entry.count == 0 {
            let subscribed = entry.subscribed;
            state.channels.remove(&channel);
            if state.connected && subscribed {
                self.enqueue(state.epoch, Command::Unsubscribe(channel));
            }
        }
    }

    /// Returns the number of live handles for a channel.
    #[must_use]
    pub fn count(&self, channel: &ChannelName) -> usize {
        self.state
            .lock()
            .channels
            .get(channel)
            .map_or(0, |entry| entry.count)
    }

    /// Returns every channel with at least one live handle.
    #[must_use]
    pub fn channels(&self) -> Vec<ChannelName> {
        let mut channels: Vec<_> = self.state.lock().channels.keys().cloned().collect();
        channels.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        channels
    }

    /// Returns the status of a wanted channel.
    #[must_use]
    pub fn status(&self, channel: &ChannelName) -> Option<ChannelStatus> {
        self.state
            .lock()
            .channels
            .get(channel)
            .map(|entry| entry.status.borrow().clone())
    }

    /// Returns true while a connection is established.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// Epoch of the live connection, if any.
    pub(crate) fn live_epoch(&self) -> Option<u64> {
        let state = self.state.lock();
        state.connected.then_some(state.epoch)
    }

    /// Marks the connection as established and returns the channels to
    /// replay: every channel with a positive count that has not failed.
    pub(crate) fn on_connected(&self) -> Session {
        let mut state = self.state.lock();
        state.connected = true;
        state.epoch += 1;

        let mut replay = Vec::new();
        for (channel, entry) in &mut state.channels {
            if entry.count > 0 && !entry.is_failed() {
                entry.subscribed = true;
                replay.push(channel.clone());
            }
        }
        replay.sort_by(|a, b| a.as_str().cmp(b.as_str()));

        debug!(epoch = state.epoch, channels = replay.len(), "replaying subscriptions");
        Session {
            epoch: state.epoch,
            replay,
        }
    }

    /// Marks the connection as lost. Counts are kept.
    pub(crate) fn on_disconnected(&self) {
        let mut state = self.state.lock();
        if !state.connected {
            return;
        }
        state.connected = false;

        for entry in state.channels.values_mut() {
            entry.subscribed = false;
            if *entry.status.borrow() == ChannelStatus::Active {
                entry.status.send_replace(ChannelStatus::Pending);
            }
        }
    }

    pub(crate) fn mark_active(&self, channel: &ChannelName, epoch: u64) {
        let state = self.state.lock();
        if !state.connected || state.epoch != epoch {
            return;
        }
        if let Some(entry) = state.channels.get(channel) {
            if entry.subscribed && !entry.is_failed() {
                entry.status.send_replace(ChannelStatus::Active);
            }
        }
    }

    pub(crate) fn mark_failed(&self, channel: &ChannelName, reason: String) {
        let mut state = self.state.lock();
        let Some(entry) = state.channels.get_mut(channel) else {
            debug!(channel = %channel, "rejection for released channel");
            return;
        };

        warn!(channel = %channel, reason = %reason, "subscription rejected");
        self.metrics.record_rejection();
        entry.subscribed = false;
        entry
            .status
            .send_replace(ChannelStatus::Failed(SubscriptionError::Rejected {
                channel: channel.clone(),
                reason,
            }));
    }

    pub(crate) fn enqueue(&self, epoch: u64, command: Command) {
        if self.commands.send(Outbound { epoch, command }).is_err() {
            debug!("command dropped, connection manager gone");
        }
    }
}

/// Interest in one channel. Released on drop.
#[derive(Debug)]
#[must_use = "dropping the handle releases the channel"]
pub struct SubscriptionHandle {
    id: u64,
    channel: ChannelName,
    status: watch::Receiver<ChannelStatus>,
    registry: Weak<ChannelRegistry>,
}

impl SubscriptionHandle {
    /// Returns the channel this handle holds.
    #[must_use]
    pub fn channel(&self) -> &ChannelName {
        &self.channel
    }

    /// Returns the current channel status.
    #[must_use]
    pub fn status(&self) -> ChannelStatus {
        self.status.borrow().clone()
    }

    /// Waits until the channel is active or refused.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::Rejected`] if the server refused the
    /// channel.
    pub async fn confirmed(&mut self) -> Result<(), SubscriptionError> {
        loop {
            let current = self.status.borrow_and_update().clone();
            match current {
                ChannelStatus::Active => return Ok(()),
                ChannelStatus::Failed(error) => return Err(error),
                ChannelStatus::Pending => {}
            }
            if self.status.changed().await.is_err() {
                return Err(SubscriptionError::Released(self.channel.clone()));
            }
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.release_id(self.id);
        }
    }
}
