//! Storefront realtime relay.
//!
//! A reference server for the realtime client: WebSocket fan-out with
//! per-channel sequences, an HTTP publish endpoint for backend
//! collaborators, and lifecycle validation of status publishes.
//!
//! # Routes
//!
//! - `GET /health` - liveness
//! - `GET /metrics` - relay counters
//! - `POST /v1/publish` - publish an event
//! - `GET /ws` - WebSocket upgrade

pub mod auth;
pub mod config;
pub mod error;
pub mod gate;
pub mod server;
pub mod state;
pub mod ws;

pub use auth::{AccessPolicy, Principal};
pub use config::{ServerConfig, ServerConfigError};
pub use error::ApiError;
pub use gate::{Admission, TransitionGate};
pub use server::Server;
pub use state::AppState;
