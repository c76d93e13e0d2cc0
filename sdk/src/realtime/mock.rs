//! In-memory transport for tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::transport::{SignalSender, Transport, TransportError, TransportSignal};
use crate::error::ConnectionError;
use crate::types::{ChannelName, InboundEvent};

/// A recorded transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Connect,
    Disconnect,
    Subscribe(String),
    Unsubscribe(String),
    Publish(String, String),
}

#[derive(Default)]
pub(crate) struct MockTransport {
    calls: Mutex<Vec<Call>>,
    signals: Mutex<Option<SignalSender>>,
    failing_connects: AtomicU32,
    connect_delay: Mutex<Option<Duration>>,
    subscribe_delay: Mutex<Option<Duration>>,
    rejected: Mutex<HashSet<String>>,
}

impl MockTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes the next `n` connect attempts fail.
    pub(crate) fn fail_next_connects(&self, n: u32) {
        self.failing_connects.store(n, Ordering::SeqCst);
    }

    /// Delays every connect attempt.
    pub(crate) fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock() = Some(delay);
    }

    /// Delays every subscribe answer.
    pub(crate) fn set_subscribe_delay(&self, delay: Duration) {
        *self.subscribe_delay.lock() = Some(delay);
    }

    /// Refuses subscriptions to `channel`.
    pub(crate) fn reject(&self, channel: &str) {
        self.rejected.lock().insert(channel.to_string());
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub(crate) fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub(crate) fn count(&self, call: &Call) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    pub(crate) fn subscribes(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::Subscribe(channel) => Some(channel.clone()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn connects(&self) -> usize {
        self.count(&Call::Connect)
    }

    /// Pushes a signal as if it came from the server.
    pub(crate) async fn signal(&self, signal: TransportSignal) {
        let sender = self.signals.lock().clone();
        if let Some(sender) = sender {
            let _ = sender.send(signal).await;
        }
    }

    pub(crate) async fn push(&self, event: InboundEvent) {
        self.signal(TransportSignal::Event(event)).await;
    }

    /// Simulates the server dropping the connection.
    pub(crate) async fn drop_connection(&self) {
        let sender = self.signals.lock().take();
        if let Some(sender) = sender {
            let _ = sender
                .send(TransportSignal::Closed {
                    reason: "connection reset".to_string(),
                })
                .await;
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, signals: SignalSender) -> Result<(), ConnectionError> {
        self.calls.lock().push(Call::Connect);

        let delay = *self.connect_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self.failing_connects.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_connects.store(failing - 1, Ordering::SeqCst);
            return Err(ConnectionError::Unreachable("connection refused".to_string()));
        }

        *self.signals.lock() = Some(signals);
        Ok(())
    }

    async fn disconnect(&self) {
        self.calls.lock().push(Call::Disconnect);
        self.signals.lock().take();
    }

    async fn subscribe(&self, channel: &ChannelName) -> Result<(), TransportError> {
        self.calls
            .lock()
            .push(Call::Subscribe(channel.as_str().to_string()));

        let delay = *self.subscribe_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.rejected.lock().contains(channel.as_str()) {
            return Err(TransportError::Rejected {
                channel: channel.clone(),
                reason: "unauthorized".to_string(),
            });
        }
        Ok(())
    }

    async fn unsubscribe(&self, channel: &ChannelName) -> Result<(), TransportError> {
        self.calls
            .lock()
            .push(Call::Unsubscribe(channel.as_str().to_string()));
        Ok(())
    }

    async fn publish(
        &self,
        channel: &ChannelName,
        event_type: &str,
        _payload: serde_json::Value,
    ) -> Result<(), TransportError> {
        if self.signals.lock().is_none() {
            return Err(TransportError::NotConnected);
        }
        self.calls.lock().push(Call::Publish(
            channel.as_str().to_string(),
            event_type.to_string(),
        ));
        Ok(())
    }
}

/// Yields to the runtime until `condition` holds or the budget runs out.
pub(crate) async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..2_000 {
        if condition() {
            return true;
        }
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    condition()
}
