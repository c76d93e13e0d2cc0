//! A channel listener bundled with its channel interest.

use std::sync::{Arc, Weak};

use super::dispatcher::{EventDispatcher, ListenerId};
use super::registry::{ChannelStatus, SubscriptionHandle};
use crate::error::SubscriptionError;
use crate::types::ChannelName;

/// Listener plus channel interest. Dropping it removes the listener and
/// then releases the channel.
#[derive(Debug)]
#[must_use = "dropping the subscription stops delivery"]
pub struct Subscription {
    listener: ListenerId,
    dispatcher: Weak<EventDispatcher>,
    handle: SubscriptionHandle,
}

impl Subscription {
    pub(crate) fn new(
        handle: SubscriptionHandle,
        listener: ListenerId,
        dispatcher: &Arc<EventDispatcher>,
    ) -> Self {
        Self {
            listener,
            dispatcher: Arc::downgrade(dispatcher),
            handle,
        }
    }

    /// Returns the channel.
    #[must_use]
    pub fn channel(&self) -> &ChannelName {
        self.handle.channel()
    }

    /// Returns the listener id.
    #[must_use]
    pub fn listener(&self) -> ListenerId {
        self.listener
    }

    /// Returns the channel status.
    #[must_use]
    pub fn status(&self) -> ChannelStatus {
        self.handle.status()
    }

    /// Waits until the channel is active or refused.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::Rejected`] if the server refused it.
    pub async fn confirmed(&mut self) -> Result<(), SubscriptionError> {
        self.handle.confirmed().await
    }

    /// Stops delivery. Equivalent to dropping.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(dispatcher) = self.dispatcher.upgrade() {
            dispatcher.unlisten(self.listener);
        }
    }
}
