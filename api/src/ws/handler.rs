//! WebSocket connection handler.
//!
//! Provides the upgrade handler and the per-connection frame loop.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use storefront_realtime_sdk::types::ChannelName;
use storefront_realtime_sdk::ws::messages::{INVALID_MESSAGE, SUBSCRIBE_REJECTED};
use storefront_realtime_sdk::ws::{ClientMessage, ServerMessage};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::connection::Connection;
use crate::auth::Principal;
use crate::state::AppState;

/// Query parameters of the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    /// Access token.
    pub token: Option<String>,
}

/// WebSocket upgrade handler.
///
/// Resolves the `token` query parameter to a principal, then upgrades.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let principal = state.policy.resolve(params.token.as_deref());
    ws.on_upgrade(move |socket| handle_connection(socket, principal, state))
}

async fn handle_connection(
    socket: WebSocket,
    principal: Principal,
    state: AppState,
) {
    state.metrics.record_connection_opened();

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(state.channel_buffer);

    let mut connection = Connection::new(principal, tx);
    let connection_id = connection.id();
    state
        .channels
        .register(connection_id, connection.sender())
        .await;
    info!(connection_id, principal = ?connection.principal(), "websocket connection opened");

    // Forward queued frames to the socket
    let metrics = Arc::clone(&state.metrics);
    let sender_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(e) => {
                    error!(error = %e, "failed to serialize frame");
                    continue;
                }
            };

            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
            metrics.record_frame_sent();
        }
    });

    while let Some(result) = ws_receiver.next().await {
        let msg = match result {
            Ok(msg) => msg,
            Err(e) => {
                warn!(connection_id, error = %e, "websocket error");
                break;
            }
        };

        state.metrics.record_frame_received();

        match msg {
            Message::Text(text) => {
                if let Some(reply) = handle_text_message(text.as_str(), &mut connection, &state).await
                {
                    if !connection.send(reply).await {
                        break;
                    }
                }
            }
            Message::Close(_) => {
                debug!(connection_id, "close requested");
                break;
            }
            _ => {}
        }
    }

    state.channels.unregister(connection_id).await;
    state.metrics.record_connection_closed();
    sender_task.abort();

    info!(
        connection_id,
        subscriptions = connection.subscription_count(),
        "websocket connection closed"
    );
}

/// Handles one text frame. Returns the reply frame, if any.
///
/// Accepted publishes have no reply; the publisher sees the event if it is
/// subscribed to the channel.
pub async fn handle_text_message(
    text: &str,
    connection: &mut Connection,
    state: &AppState,
) -> Option<ServerMessage> {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            state.metrics.record_malformed_frame();
            warn!(connection_id = connection.id(), error = %e, "malformed frame");
            return Some(ServerMessage::error(
                INVALID_MESSAGE,
                format!("invalid frame: {e}"),
            ));
        }
    };

    match msg {
        ClientMessage::Subscribe { channel, token } => {
            Some(handle_subscribe(channel, token, connection, state).await)
        }
        ClientMessage::Unsubscribe { channel } => {
            Some(handle_unsubscribe(channel, connection, state).await)
        }
        ClientMessage::Publish {
            channel,
            event_type,
            payload,
        } => state
            .publish(connection.principal(), channel.clone(), &event_type, payload)
            .await
            .err()
            .map(|e| ServerMessage::channel_error(e.code(), e.to_string(), channel)),
        ClientMessage::Ping { timestamp } => Some(ServerMessage::Pong { timestamp }),
    }
}

async fn handle_subscribe(
    channel: ChannelName,
    token: Option<String>,
    connection: &mut Connection,
    state: &AppState,
) -> ServerMessage {
    let principal = match token.as_deref() {
        Some(token) => state.policy.resolve(Some(token)),
        None => connection.principal().clone(),
    };

    if !state.policy.can_subscribe(&principal, &channel) {
        state.metrics.record_subscription_rejected();
        warn!(connection_id = connection.id(), channel = %channel, "subscription refused");
        return ServerMessage::channel_error(
            SUBSCRIBE_REJECTED,
            "not authorized for this channel",
            channel,
        );
    }

    if connection.subscribe(channel.clone()) {
        state
            .channels
            .subscribe(channel.clone(), connection.id())
            .await;
        state.metrics.record_subscription();
        debug!(connection_id = connection.id(), channel = %channel, "subscribed");
    }

    ServerMessage::Subscribed { channel }
}

async fn handle_unsubscribe(
    channel: ChannelName,
    connection: &mut Connection,
    state: &AppState,
) -> ServerMessage {
    if connection.unsubscribe(&channel) {
        state.channels.unsubscribe(&channel, connection.id()).await;
        state.metrics.record_unsubscription();
        debug!(connection_id = connection.id(), channel = %channel, "unsubscribed");
    }

    ServerMessage::Unsubscribed { channel }
}
