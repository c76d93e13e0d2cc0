//! WebSocket hub.
//!
//! Clients connect to `GET /ws?token=...` and exchange the JSON frames of
//! `storefront_realtime_sdk::ws::messages`.
//!
//! # Channels
//!
//! - `order:{id}` - order status changes
//! - `user:{id}:notifications` - per-user notices (token `user:{id}`)
//! - `chat:session:{id}` - support chat
//! - `admin:orders` - new order feed (admin token)

pub mod channels;
pub mod connection;
pub mod handler;
pub mod metrics;

pub use channels::{ChannelManager, Fanout};
pub use connection::Connection;
pub use handler::ws_handler;
pub use metrics::{RelayMetrics, RelayMetricsSnapshot};
