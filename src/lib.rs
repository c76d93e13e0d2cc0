//! Storefront realtime - umbrella crate.
//!
//! Re-exports the client SDK so applications can depend on a single crate.
//! The relay server lives in `storefront-realtime-api`.

pub use storefront_realtime_sdk::*;
