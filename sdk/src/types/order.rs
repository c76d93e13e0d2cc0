//! Order lifecycle.
//!
//! `pending → confirmed → processing → shipped → completed`, with
//! `cancelled` reachable from any non-terminal state. Forward moves may skip
//! intermediate states so a client that missed events can catch up; backward
//! moves and moves out of `completed`/`cancelled` are rejected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::lifecycle::{InvalidTransitionError, Lifecycle};
use crate::error::SdkError;

/// Order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Placed, awaiting confirmation.
    Pending,
    /// Confirmed by the shop.
    Confirmed,
    /// Being prepared.
    Processing,
    /// Handed to the carrier.
    Shipped,
    /// Delivered and closed.
    Completed,
    /// Cancelled before completion.
    Cancelled,
}

impl OrderStatus {
    /// All statuses in chain order, `cancelled` last.
    pub const ALL: [Self; 6] = [
        Self::Pending,
        Self::Confirmed,
        Self::Processing,
        Self::Shipped,
        Self::Completed,
        Self::Cancelled,
    ];

    /// Position in the forward chain. `cancelled` sits outside the chain.
    const fn rank(self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Confirmed => Some(1),
            Self::Processing => Some(2),
            Self::Shipped => Some(3),
            Self::Completed => Some(4),
            Self::Cancelled => None,
        }
    }

    /// Returns true if the order is still moving through the chain.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Display label shown to shoppers.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Pending => "Ausstehend",
            Self::Confirmed => "Bestätigt",
            Self::Processing => "In Bearbeitung",
            Self::Shipped => "Versandt",
            Self::Completed => "Abgeschlossen",
            Self::Cancelled => "Storniert",
        }
    }

    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| SdkError::UnknownVariant {
                kind: "order status",
                value: s.to_string(),
            })
    }
}

/// Events that move an order through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEvent {
    /// Shop confirms the order.
    MarkConfirmed,
    /// Shop starts preparing the order.
    MarkProcessing,
    /// Order handed to the carrier.
    MarkShipped,
    /// Order delivered.
    MarkCompleted,
    /// Order cancelled.
    MarkCancelled,
}

impl OrderEvent {
    const ALL: [Self; 5] = [
        Self::MarkConfirmed,
        Self::MarkProcessing,
        Self::MarkShipped,
        Self::MarkCompleted,
        Self::MarkCancelled,
    ];

    /// The status this event moves to.
    #[must_use]
    pub const fn target(&self) -> OrderStatus {
        match self {
            Self::MarkConfirmed => OrderStatus::Confirmed,
            Self::MarkProcessing => OrderStatus::Processing,
            Self::MarkShipped => OrderStatus::Shipped,
            Self::MarkCompleted => OrderStatus::Completed,
            Self::MarkCancelled => OrderStatus::Cancelled,
        }
    }

    /// The event that moves an order to `status`.
    ///
    /// `pending` is the initial state and has no event.
    #[must_use]
    pub const fn for_target(status: OrderStatus) -> Option<Self> {
        match status {
            OrderStatus::Pending => None,
            OrderStatus::Confirmed => Some(Self::MarkConfirmed),
            OrderStatus::Processing => Some(Self::MarkProcessing),
            OrderStatus::Shipped => Some(Self::MarkShipped),
            OrderStatus::Completed => Some(Self::MarkCompleted),
            OrderStatus::Cancelled => Some(Self::MarkCancelled),
        }
    }

    /// Wire name of the event.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MarkConfirmed => "mark_confirmed",
            Self::MarkProcessing => "mark_processing",
            Self::MarkShipped => "mark_shipped",
            Self::MarkCompleted => "mark_completed",
            Self::MarkCancelled => "mark_cancelled",
        }
    }
}

impl fmt::Display for OrderEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderEvent {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| SdkError::UnknownVariant {
                kind: "order event",
                value: s.to_string(),
            })
    }
}

impl Lifecycle for OrderStatus {
    type Event = OrderEvent;

    const MACHINE: &'static str = "order";

    fn transition(self, event: OrderEvent) -> Result<Self, InvalidTransitionError> {
        let target = event.target();
        if target == self {
            return Ok(self);
        }
        if self.is_terminal() {
            return Err(InvalidTransitionError::new(Self::MACHINE, self, event));
        }

        let forward = match (self.rank(), target.rank()) {
            (_, None) => true,
            (Some(from), Some(to)) => to > from,
            (None, Some(_)) => false,
        };

        if forward {
            Ok(target)
        } else {
            Err(InvalidTransitionError::new(Self::MACHINE, self, event))
        }
    }

    fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    fn event_for(status: Self) -> Option<OrderEvent> {
        OrderEvent::for_target(status)
    }
}
