//! HTTP server and routes.

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use storefront_realtime_sdk::types::ChannelName;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::state::AppState;
use crate::ws::ws_handler;

/// Body of `POST /v1/publish`.
#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    /// Target channel.
    pub channel: String,

    /// Event type.
    #[serde(rename = "type")]
    pub event_type: String,

    /// Event payload.
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Builds the relay router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/v1/publish", post(publish))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

async fn publish(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<PublishRequest>,
) -> Result<Response, ApiError> {
    let channel = ChannelName::parse(request.channel)?;
    let principal = state.policy.resolve(bearer_token(&headers));

    let published = state
        .publish(&principal, channel, &request.event_type, request.payload)
        .await?;

    Ok(match published {
        Some(event) => (
            StatusCode::ACCEPTED,
            Json(json!({ "published": true, "event": event })),
        )
            .into_response(),
        None => Json(json!({ "published": false })).into_response(),
    })
}

/// The relay server.
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    state: AppState,
}

impl Server {
    /// Creates a server.
    #[must_use]
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Returns the router for this server.
    #[must_use]
    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Binds and serves until Ctrl+C.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or binding fails.
    pub async fn run(self) -> anyhow::Result<()> {
        self.config.validate()?;
        let addr = self.config.addr()?;

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(%addr, "relay listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("relay stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
