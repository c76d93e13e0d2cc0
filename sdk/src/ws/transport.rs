//! WebSocket transport.
//!
//! Speaks the JSON frames in [`super::messages`] over tokio-tungstenite.
//! A reader task turns server frames into [`TransportSignal`]s and answers
//! pending subscribes; a heartbeat task pings on an interval.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use super::config::WsConfig;
use super::error::WsError;
use super::messages::{ClientMessage, ServerMessage, SUBSCRIBE_REJECTED};
use crate::error::ConnectionError;
use crate::realtime::{SignalSender, Transport, TransportError, TransportSignal};
use crate::types::ChannelName;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;
type SubscribeReply = oneshot::Sender<Result<(), TransportError>>;
type PendingSubscribes = Arc<parking_lot::Mutex<HashMap<ChannelName, SubscribeReply>>>;

/// WebSocket implementation of [`Transport`].
#[derive(Debug)]
pub struct WsTransport {
    config: WsConfig,
    sink: Arc<Mutex<Option<WsSink>>>,
    pending: PendingSubscribes,
    tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl WsTransport {
    /// Creates a transport with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: WsConfig) -> Result<Self, WsError> {
        config.validate()?;

        Ok(Self {
            config,
            sink: Arc::new(Mutex::new(None)),
            pending: Arc::new(parking_lot::Mutex::new(HashMap::new())),
            tasks: parking_lot::Mutex::new(Vec::new()),
        })
    }

    /// Creates a transport for the given URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn with_url(url: impl Into<String>) -> Result<Self, WsError> {
        Self::new(WsConfig::new(url))
    }

    /// Returns the transport configuration.
    #[must_use]
    pub fn config(&self) -> &WsConfig {
        &self.config
    }

    async fn send(&self, msg: &ClientMessage) -> Result<(), WsError> {
        let json = serde_json::to_string(msg).map_err(|e| WsError::Encode(e.to_string()))?;

        let mut sink_guard = self.sink.lock().await;
        let sink = sink_guard.as_mut().ok_or(WsError::NotConnected)?;

        sink.send(Message::Text(json.into()))
            .await
            .map_err(|e| WsError::Write(e.to_string()))
    }

    fn spawn_heartbeat(&self) -> JoinHandle<()> {
        let sink = Arc::clone(&self.sink);
        let interval = self.config.heartbeat_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;

                let msg = ClientMessage::Ping {
                    timestamp: chrono::Utc::now().timestamp_millis().max(0) as u64,
                };
                let Ok(json) = serde_json::to_string(&msg) else {
                    continue;
                };

                let mut guard = sink.lock().await;
                let Some(sink) = guard.as_mut() else {
                    break;
                };
                if let Err(error) = sink.send(Message::Text(json.into())).await {
                    debug!(%error, "heartbeat failed");
                    break;
                }
            }
        })
    }

    fn abort_tasks(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

/// Routes one server frame. Returns the signal to forward, if any.
fn route_frame(msg: ServerMessage, pending: &PendingSubscribes) -> Option<TransportSignal> {
    match msg {
        ServerMessage::Event { event } => Some(TransportSignal::Event(event)),
        ServerMessage::Subscribed { channel } => {
            match pending.lock().remove(&channel) {
                Some(reply) => {
                    let _ = reply.send(Ok(()));
                }
                None => debug!(channel = %channel, "unsolicited subscribe confirmation"),
            }
            None
        }
        ServerMessage::Unsubscribed { channel } => {
            debug!(channel = %channel, "unsubscribe confirmed");
            None
        }
        ServerMessage::Error {
            code,
            message,
            channel: Some(channel),
        } if code == SUBSCRIBE_REJECTED => {
            let reply = pending.lock().remove(&channel);
            match reply {
                Some(reply) => {
                    let _ = reply.send(Err(TransportError::Rejected {
                        channel,
                        reason: message,
                    }));
                    None
                }
                None => Some(TransportSignal::Rejected {
                    channel,
                    reason: message,
                }),
            }
        }
        ServerMessage::Error {
            code,
            message,
            channel,
        } => {
            warn!(%code, %message, channel = ?channel, "server error");
            None
        }
        ServerMessage::Pong { timestamp } => {
            trace!(timestamp, "pong");
            None
        }
    }
}

async fn read_frames(mut source: WsSource, signals: SignalSender, pending: PendingSubscribes) {
    let reason = loop {
        match source.next().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerMessage>(&text) {
                Ok(msg) => {
                    if let Some(signal) = route_frame(msg, &pending) {
                        if signals.send(signal).await.is_err() {
                            break "signal receiver dropped".to_string();
                        }
                    }
                }
                Err(error) => warn!(%error, "ignoring malformed frame"),
            },
            Some(Ok(Message::Close(frame))) => {
                break frame.map_or_else(
                    || "closed by server".to_string(),
                    |frame| frame.reason.to_string(),
                );
            }
            Some(Ok(_)) => {}
            Some(Err(error)) => break error.to_string(),
            None => break "stream ended".to_string(),
        }
    };

    pending.lock().clear();
    let _ = signals.send(TransportSignal::Closed { reason }).await;
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, signals: SignalSender) -> Result<(), ConnectionError> {
        let url = self.config.connection_url();

        let (ws_stream, _) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|e| match e {
                tungstenite::Error::Http(response) => {
                    ConnectionError::Handshake(format!("HTTP {}", response.status()))
                }
                other => ConnectionError::Unreachable(other.to_string()),
            })?;

        let (sink, source) = ws_stream.split();
        *self.sink.lock().await = Some(sink);

        let reader = tokio::spawn(read_frames(source, signals, Arc::clone(&self.pending)));
        let heartbeat = self.spawn_heartbeat();

        self.abort_tasks();
        self.tasks.lock().extend([reader, heartbeat]);

        info!(url = %self.config.url, "websocket connected");
        Ok(())
    }

    async fn disconnect(&self) {
        self.abort_tasks();
        self.pending.lock().clear();

        if let Some(mut sink) = self.sink.lock().await.take() {
            if let Err(error) = sink.close().await {
                debug!(%error, "close frame not delivered");
            }
        }
        debug!("websocket disconnected");
    }

    async fn subscribe(&self, channel: &ChannelName) -> Result<(), TransportError> {
        let (reply, answer) = oneshot::channel();
        self.pending.lock().insert(channel.clone(), reply);

        let msg = ClientMessage::Subscribe {
            channel: channel.clone(),
            token: self.config.token.clone(),
        };
        if let Err(error) = self.send(&msg).await {
            self.pending.lock().remove(channel);
            return Err(error.into());
        }

        match tokio::time::timeout(self.config.subscribe_timeout, answer).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TransportError::NotConnected),
            Err(_) => {
                self.pending.lock().remove(channel);
                Err(TransportError::Timeout)
            }
        }
    }

    async fn unsubscribe(&self, channel: &ChannelName) -> Result<(), TransportError> {
        self.send(&ClientMessage::Unsubscribe {
            channel: channel.clone(),
        })
        .await
        .map_err(TransportError::from)
    }

    async fn publish(
        &self,
        channel: &ChannelName,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<(), TransportError> {
        self.send(&ClientMessage::Publish {
            channel: channel.clone(),
            event_type: event_type.to_string(),
            payload,
        })
        .await
        .map_err(TransportError::from)
    }
}
