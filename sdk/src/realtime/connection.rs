//! Connection lifecycle.
//!
//! A single supervisor task owns the transport. It connects, replays the
//! registry's channels, pumps inbound signals and queued commands, and on
//! loss backs off and reconnects until [`ConnectionManager::disconnect`].
//! All state transitions happen on that task, so observers see them in
//! order.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::backoff::Backoff;
use super::config::RealtimeConfig;
use super::dispatcher::EventDispatcher;
use super::metrics::RealtimeMetrics;
use super::registry::{ChannelRegistry, Session};
use super::transport::{Command, CommandReceiver, Outbound, Transport, TransportError, TransportSignal};
use crate::error::ConnectionError;
use crate::types::ChannelName;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection and no attempt in flight.
    Disconnected,
    /// An attempt is in flight.
    Connecting,
    /// Connected and pumping events.
    Connected,
}

impl ConnectionState {
    /// Returns true if connected.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Callback invoked on every state transition.
pub type StateObserver = Arc<dyn Fn(ConnectionState) + Send + Sync>;

/// Identifies a registered state observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Outcome = Option<Result<(), ConnectionError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Lost,
    Shutdown,
}

#[derive(Default)]
struct RunState {
    /// Present while a supervisor is running.
    shutdown: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    registry: Arc<ChannelRegistry>,
    dispatcher: Arc<EventDispatcher>,
    config: RealtimeConfig,
    metrics: Arc<RealtimeMetrics>,
    state: watch::Sender<ConnectionState>,
    /// Result of the latest attempt; `None` while one is in flight.
    outcome: watch::Sender<Outcome>,
    observers: Mutex<Vec<(ObserverId, StateObserver)>>,
    next_observer: AtomicU64,
    commands: tokio::sync::Mutex<CommandReceiver>,
    run: Mutex<RunState>,
}

/// Owns the transport connection.
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        registry: Arc<ChannelRegistry>,
        dispatcher: Arc<EventDispatcher>,
        commands: CommandReceiver,
        config: RealtimeConfig,
        metrics: Arc<RealtimeMetrics>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (outcome, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                transport,
                registry,
                dispatcher,
                config,
                metrics,
                state,
                outcome,
                observers: Mutex::new(Vec::new()),
                next_observer: AtomicU64::new(1),
                commands: tokio::sync::Mutex::new(commands),
                run: Mutex::new(RunState::default()),
            }),
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Returns a receiver that tracks the current state.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Registers a callback fired on every state transition, including
    /// each failed attempt.
    pub fn on_state_change<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        let id = ObserverId(self.inner.next_observer.fetch_add(1, Ordering::Relaxed));
        self.inner.observers.lock().push((id, Arc::new(observer)));
        id
    }

    /// Removes a state observer. Returns false if it was not registered.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let mut observers = self.inner.observers.lock();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    /// Connects, or joins the attempt already in flight.
    ///
    /// Returns immediately when already connected. A failed attempt is
    /// reported here and retried in the background until
    /// [`disconnect`](Self::disconnect).
    ///
    /// # Errors
    ///
    /// Returns the error of the attempt this call observed.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        let mut outcome = {
            let mut run = self.inner.run.lock();
            if run.shutdown.is_some() && self.state().is_connected() {
                return Ok(());
            }
            if run.shutdown.is_none() {
                let (shutdown_tx, shutdown_rx) = watch::channel(false);
                self.inner.outcome.send_replace(None);
                let previous = run.task.take();
                run.task = Some(tokio::spawn(supervise(
                    Arc::clone(&self.inner),
                    shutdown_rx,
                    previous,
                )));
                run.shutdown = Some(shutdown_tx);
            }
            self.inner.outcome.subscribe()
        };

        let observed = outcome
            .wait_for(Option::is_some)
            .await
            .map(|value| value.clone());
        match observed {
            Ok(Some(result)) => result,
            _ => Err(ConnectionError::Closed),
        }
    }

    /// Tears the connection down and stops reconnecting.
    ///
    /// The transition to `disconnected` is performed by the supervisor and
    /// is observable through [`on_state_change`](Self::on_state_change).
    pub fn disconnect(&self) {
        let mut run = self.inner.run.lock();
        if let Some(shutdown) = run.shutdown.take() {
            info!("disconnect requested");
            shutdown.send_replace(true);
        }
    }

    /// Publishes an event on the live connection.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotConnected`] when there is no live
    /// connection, or the transport's error.
    pub async fn publish(
        &self,
        channel: ChannelName,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Result<(), TransportError> {
        let epoch = self
            .inner
            .registry
            .live_epoch()
            .ok_or(TransportError::NotConnected)?;

        let (reply, response) = oneshot::channel();
        self.inner.registry.enqueue(
            epoch,
            Command::Publish {
                channel,
                event_type: event_type.into(),
                payload,
                reply,
            },
        );
        response.await.unwrap_or(Err(TransportError::NotConnected))
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl Inner {
    fn set_state(&self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if !changed {
            return;
        }

        info!(state = %next, "connection state changed");
        let observers: Vec<StateObserver> = self
            .observers
            .lock()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in observers {
            if catch_unwind(AssertUnwindSafe(|| observer(next))).is_err() {
                error!(state = %next, "state observer panicked");
            }
        }
    }

    /// Subscribes while still draining `signals`, so a confirmation routed
    /// behind a burst of events is never starved.
    async fn subscribe(
        &self,
        epoch: u64,
        channel: &ChannelName,
        signals: &mut mpsc::Receiver<TransportSignal>,
    ) -> Result<(), SessionEnd> {
        self.metrics.record_subscribe();
        let request = self.transport.subscribe(channel);
        tokio::pin!(request);

        let result = loop {
            tokio::select! {
                biased;
                result = &mut request => break result,
                signal = signals.recv() => self.on_signal(signal)?,
            }
        };

        match result {
            Ok(()) => {
                debug!(channel = %channel, "subscribed");
                self.registry.mark_active(channel, epoch);
                Ok(())
            }
            Err(TransportError::Rejected { reason, .. }) => {
                self.registry.mark_failed(channel, reason);
                Ok(())
            }
            Err(error) => {
                warn!(channel = %channel, %error, "subscribe failed");
                Err(SessionEnd::Lost)
            }
        }
    }

    fn on_signal(&self, signal: Option<TransportSignal>) -> Result<(), SessionEnd> {
        match signal {
            Some(TransportSignal::Event(event)) => {
                self.dispatcher.on_inbound(&event);
                Ok(())
            }
            Some(TransportSignal::Rejected { channel, reason }) => {
                self.registry.mark_failed(&channel, reason);
                Ok(())
            }
            Some(TransportSignal::Closed { reason }) => {
                warn!(%reason, "connection lost");
                Err(SessionEnd::Lost)
            }
            None => {
                warn!("transport dropped its signal channel");
                Err(SessionEnd::Lost)
            }
        }
    }

    async fn execute(
        &self,
        epoch: u64,
        outbound: Outbound,
        signals: &mut mpsc::Receiver<TransportSignal>,
    ) -> Result<(), SessionEnd> {
        if outbound.epoch != epoch {
            debug!(command_epoch = outbound.epoch, epoch, "discarding stale command");
            if let Command::Publish { reply, .. } = outbound.command {
                let _ = reply.send(Err(TransportError::NotConnected));
            }
            return Ok(());
        }

        match outbound.command {
            Command::Subscribe(channel) => self.subscribe(epoch, &channel, signals).await,
            Command::Unsubscribe(channel) => {
                self.metrics.record_unsubscribe();
                match self.transport.unsubscribe(&channel).await {
                    Ok(()) => {
                        debug!(channel = %channel, "unsubscribed");
                        Ok(())
                    }
                    Err(error) if !error.is_fatal() => Ok(()),
                    Err(error) => {
                        warn!(channel = %channel, %error, "unsubscribe failed");
                        Err(SessionEnd::Lost)
                    }
                }
            }
            Command::Publish {
                channel,
                event_type,
                payload,
                reply,
            } => {
                let result = self.transport.publish(&channel, &event_type, payload).await;
                let fatal = matches!(&result, Err(error) if error.is_fatal());
                let _ = reply.send(result);
                if fatal {
                    Err(SessionEnd::Lost)
                } else {
                    Ok(())
                }
            }
        }
    }

    async fn run_session(
        &self,
        session: Session,
        signals: &mut mpsc::Receiver<TransportSignal>,
        commands: &mut CommandReceiver,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        let epoch = session.epoch;
        for channel in &session.replay {
            if let Err(end) = self.subscribe(epoch, channel, signals).await {
                return end;
            }
        }

        loop {
            tokio::select! {
                biased;
                () = stopped(shutdown) => return SessionEnd::Shutdown,
                signal = signals.recv() => {
                    if let Err(end) = self.on_signal(signal) {
                        return end;
                    }
                }
                Some(outbound) = commands.recv() => {
                    if let Err(end) = self.execute(epoch, outbound, signals).await {
                        return end;
                    }
                }
            }
        }
    }
}

async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn supervise(
    inner: Arc<Inner>,
    mut shutdown: watch::Receiver<bool>,
    previous: Option<JoinHandle<()>>,
) {
    if let Some(previous) = previous {
        let _ = previous.await;
    }

    let mut commands = inner.commands.lock().await;
    let mut backoff = Backoff::new(inner.config.backoff);

    while !*shutdown.borrow() {
        inner.outcome.send_replace(None);
        inner.set_state(ConnectionState::Connecting);
        inner.metrics.record_connect_attempt();

        let (signals_tx, mut signals) = mpsc::channel(inner.config.command_buffer);
        let attempt = tokio::select! {
            biased;
            () = stopped(&mut shutdown) => break,
            result = inner.transport.connect(signals_tx) => result,
        };

        match attempt {
            Ok(()) => {
                backoff.reset();
                let session = inner.registry.on_connected();
                info!(epoch = session.epoch, "connected");
                inner.set_state(ConnectionState::Connected);
                inner.outcome.send_replace(Some(Ok(())));

                let end = inner
                    .run_session(session, &mut signals, &mut commands, &mut shutdown)
                    .await;
                inner.registry.on_disconnected();
                if end == SessionEnd::Shutdown {
                    break;
                }
                inner.metrics.record_session_lost();
                inner.transport.disconnect().await;
                inner.set_state(ConnectionState::Disconnected);
            }
            Err(error) => {
                inner.metrics.record_connect_failure();
                warn!(attempt = backoff.attempt() + 1, %error, "connection attempt failed");
                inner.outcome.send_replace(Some(Err(error)));
                inner.set_state(ConnectionState::Disconnected);
            }
        }

        let delay = backoff.next_delay();
        info!(delay_ms = delay.as_millis() as u64, "reconnecting after backoff");
        tokio::select! {
            biased;
            () = stopped(&mut shutdown) => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    inner.registry.on_disconnected();
    inner.transport.disconnect().await;
    inner.set_state(ConnectionState::Disconnected);
    inner.outcome.send_if_modified(|outcome| {
        if outcome.is_some() {
            return false;
        }
        *outcome = Some(Err(ConnectionError::Aborted));
        true
    });

    let mut stale = 0usize;
    while commands.try_recv().is_ok() {
        stale += 1;
    }
    debug!(stale, "supervisor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;
    use tokio::sync::mpsc;

    use crate::realtime::backoff::BackoffPolicy;
    use crate::realtime::mock::{wait_until, Call, MockTransport};
    use crate::realtime::registry::ChannelStatus;
    use crate::types::InboundEvent;

    struct Harness {
        transport: Arc<MockTransport>,
        registry: Arc<ChannelRegistry>,
        dispatcher: Arc<EventDispatcher>,
        manager: ConnectionManager,
        states: Arc<Mutex<Vec<ConnectionState>>>,
    }

    fn harness() -> Harness {
        harness_with(RealtimeConfig::default())
    }

    fn harness_with(config: RealtimeConfig) -> Harness {
        let transport = MockTransport::new();
        let metrics = Arc::new(RealtimeMetrics::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let registry = ChannelRegistry::new(tx, Arc::clone(&metrics));
        let dispatcher = Arc::new(EventDispatcher::new(200, Arc::clone(&metrics)));
        let config = config.with_backoff(
            BackoffPolicy::default()
                .with_base_delay(Duration::from_millis(100))
                .with_max_delay(Duration::from_secs(5))
                .with_jitter(0.0),
        );
        let manager = ConnectionManager::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::clone(&registry),
            Arc::clone(&dispatcher),
            rx,
            config,
            metrics,
        );

        let states = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&states);
        manager.on_state_change(move |state| sink.lock().push(state));

        Harness {
            transport,
            registry,
            dispatcher,
            manager,
            states,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_reports_transitions() {
        let h = harness();
        assert_eq!(h.manager.state(), ConnectionState::Disconnected);

        assert_eq!(h.manager.connect().await, Ok(()));
        assert_eq!(h.manager.state(), ConnectionState::Connected);
        assert_eq!(
            *h.states.lock(),
            vec![ConnectionState::Connecting, ConnectionState::Connected]
        );

        assert_eq!(h.manager.connect().await, Ok(()));
        assert_eq!(h.transport.connects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_connect_opens_once() {
        let h = harness();
        h.transport.set_connect_delay(Duration::from_millis(50));

        let (first, second) = tokio::join!(h.manager.connect(), h.manager.connect());
        assert_eq!(first, Ok(()));
        assert_eq!(second, Ok(()));
        assert_eq!(h.transport.connects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_attempts_back_off_then_connect() {
        let h = harness();
        h.transport.fail_next_connects(2);
        let started = tokio::time::Instant::now();

        assert!(matches!(
            h.manager.connect().await,
            Err(ConnectionError::Unreachable(_))
        ));
        assert!(wait_until(|| h.manager.state().is_connected()).await);

        assert_eq!(h.transport.connects(), 3);
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert_eq!(
            *h.states.lock(),
            vec![
                ConnectionState::Connecting,
                ConnectionState::Disconnected,
                ConnectionState::Connecting,
                ConnectionState::Disconnected,
                ConnectionState::Connecting,
                ConnectionState::Connected,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_replays_each_channel_once() {
        let h = harness();
        let _order = h.registry.acquire(ChannelName::order("A"));
        let _admin = h.registry.acquire(ChannelName::admin_orders());

        h.manager.connect().await.expect("connect");
        assert!(wait_until(|| h.transport.subscribes().len() == 2).await);
        assert_eq!(h.transport.subscribes(), vec!["admin:orders", "order:A"]);

        h.transport.clear_calls();
        h.transport.drop_connection().await;

        assert!(wait_until(|| h.transport.subscribes().len() == 2).await);
        assert!(h.manager.state().is_connected());
        assert_eq!(h.transport.subscribes(), vec!["admin:orders", "order:A"]);
        assert_eq!(h.transport.connects(), 1);
        assert_eq!(
            h.registry.status(&ChannelName::order("A")),
            Some(ChannelStatus::Active)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_while_connected_subscribes_once() {
        let h = harness();
        h.manager.connect().await.expect("connect");

        let first = h.registry.acquire(ChannelName::order("A"));
        let _second = h.registry.acquire(ChannelName::order("A"));
        assert!(wait_until(|| h.transport.subscribes().len() == 1).await);

        drop(first);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(h.transport.count(&Call::Unsubscribe("order:A".to_string())), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_stops_retrying() {
        let h = harness();
        h.transport.fail_next_connects(u32::MAX);

        assert!(h.manager.connect().await.is_err());
        h.manager.disconnect();
        assert!(wait_until(|| h.transport.count(&Call::Disconnect) == 1).await);
        assert_eq!(h.manager.state(), ConnectionState::Disconnected);

        let attempts = h.transport.connects();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.transport.connects(), attempts);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_after_disconnect() {
        let h = harness();
        h.manager.connect().await.expect("connect");
        h.manager.disconnect();
        assert!(wait_until(|| h.manager.state() == ConnectionState::Disconnected).await);

        assert_eq!(h.manager.connect().await, Ok(()));
        assert_eq!(h.transport.connects(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_requires_connection() {
        let h = harness();
        assert_eq!(
            h.manager
                .publish(ChannelName::order("A"), "status", json!({}))
                .await,
            Err(TransportError::NotConnected)
        );

        h.manager.connect().await.expect("connect");
        assert_eq!(
            h.manager
                .publish(ChannelName::order("A"), "status", json!({}))
                .await,
            Ok(())
        );
        assert_eq!(
            h.transport.count(&Call::Publish("order:A".to_string(), "status".to_string())),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbound_events_reach_dispatcher() {
        let h = harness();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let channel = ChannelName::order("A");
        h.dispatcher
            .listen(channel.clone(), None, move |event| sink.lock().push(event.id.clone()));

        h.manager.connect().await.expect("connect");
        h.transport
            .push(InboundEvent::new(channel, "status", json!({})).with_id("e1"))
            .await;

        assert!(wait_until(|| received.lock().len() == 1).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_flow_while_subscribe_pending() {
        let h = harness_with(RealtimeConfig::default().with_command_buffer(2));
        let live = ChannelName::admin_orders();
        let received = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&received);
        h.dispatcher.listen(live.clone(), None, move |_| *sink.lock() += 1);

        h.manager.connect().await.expect("connect");
        h.transport.set_subscribe_delay(Duration::from_secs(1));
        let mut handle = h.registry.acquire(ChannelName::order("B"));
        assert!(wait_until(|| h.transport.subscribes().len() == 1).await);

        let started = tokio::time::Instant::now();
        for n in 0..10 {
            h.transport
                .push(InboundEvent::new(live.clone(), "created", json!({})).with_id(format!("e{n}")))
                .await;
        }
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(wait_until(|| *received.lock() == 10).await);

        assert_eq!(handle.confirmed().await, Ok(()));
        assert!(h.manager.state().is_connected());
        assert_eq!(h.transport.connects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_subscription_surfaces_on_handle() {
        let h = harness();
        h.transport.reject("admin:orders");
        let mut handle = h.registry.acquire(ChannelName::admin_orders());

        h.manager.connect().await.expect("connect");
        assert!(handle.confirmed().await.is_err());

        h.transport.clear_calls();
        h.transport.drop_connection().await;
        assert!(wait_until(|| h.transport.connects() == 1).await);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(h.transport.subscribes().is_empty());
    }
}
