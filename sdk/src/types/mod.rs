//! Core types for the storefront realtime layer.
//!
//! Channel names, the inbound event envelope, and the lifecycle state
//! machines for orders and identity verification.

pub mod channel;
pub mod event;
pub mod lifecycle;
pub mod order;
pub mod verification;

pub use channel::{ChannelName, ChannelNameError};
pub use event::{DropReason, InboundEvent};
pub use lifecycle::{Applied, InvalidTransitionError, Lifecycle, StatusPayload, STATUS_EVENT_TYPE};
pub use order::{OrderEvent, OrderStatus};
pub use verification::{
    VerificationEvent, VerificationRequest, VerificationStatus, VerificationUpdate,
    VERIFICATION_EVENT_TYPE,
};
