//! WebSocket transport for the realtime client.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use storefront_realtime_sdk::realtime::RealtimeClient;
//! use storefront_realtime_sdk::types::{ChannelName, OrderStatus};
//! use storefront_realtime_sdk::ws::{WsConfig, WsTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = WsTransport::new(WsConfig::new("wss://shop.example/ws").with_token("user:42"))?;
//!     let client = RealtimeClient::with_defaults(Arc::new(transport))?;
//!
//!     let (sink, mut effects) = tokio::sync::mpsc::unbounded_channel();
//!     let bridge = client.bridge(sink);
//!     let _order = bridge.bind_order_status("1042", OrderStatus::Pending);
//!
//!     client.connect().await?;
//!     while let Some(effect) = effects.recv().await {
//!         println!("{effect:?}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod messages;
pub mod transport;

pub use config::WsConfig;
pub use error::WsError;
pub use messages::{ClientMessage, ServerMessage};
pub use transport::WsTransport;
