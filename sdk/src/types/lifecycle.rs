//! Shared contract for the lifecycle state machines.
//!
//! Machines are pure: no I/O, no notification text. Servers reject a state
//! update when [`Lifecycle::transition`] fails; clients ignore incoming
//! events that would be an invalid transition from their cached state.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::SdkError;

/// Event type carrying a [`StatusPayload`].
pub const STATUS_EVENT_TYPE: &str = "status";

/// A requested transition is not in the allowed edge set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {machine} transition: {event} from {from}")]
pub struct InvalidTransitionError {
    /// Machine name, e.g. `order`.
    pub machine: &'static str,
    /// State the transition was attempted from.
    pub from: String,
    /// Rejected event.
    pub event: String,
}

impl InvalidTransitionError {
    /// Creates a new error.
    #[must_use]
    pub fn new(machine: &'static str, from: impl fmt::Display, event: impl fmt::Display) -> Self {
        Self {
            machine,
            from: from.to_string(),
            event: event.to_string(),
        }
    }
}

/// Result of applying an event to a cached state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied<S> {
    /// The state moved to a new value.
    Changed(S),
    /// The event was already applied; nothing changed.
    Unchanged,
}

impl<S> Applied<S> {
    /// Returns the new state if it changed.
    #[must_use]
    pub fn changed(self) -> Option<S> {
        match self {
            Self::Changed(state) => Some(state),
            Self::Unchanged => None,
        }
    }
}

/// A lifecycle state machine.
pub trait Lifecycle: Copy + Eq + fmt::Debug + fmt::Display + Sized {
    /// Events that drive the machine.
    type Event: Copy + Eq + fmt::Debug + fmt::Display;

    /// Machine name used in errors and logs.
    const MACHINE: &'static str;

    /// Computes the next state.
    ///
    /// Re-applying an event whose target is the current state returns the
    /// current state.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransitionError`] if the edge is not allowed.
    fn transition(self, event: Self::Event) -> Result<Self, InvalidTransitionError>;

    /// Returns true if no further transition is permitted.
    fn is_terminal(self) -> bool;

    /// Returns the event whose target is `status`. Initial states have none.
    fn event_for(status: Self) -> Option<Self::Event>;

    /// Applies an event, distinguishing real changes from idempotent repeats.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransitionError`] if the edge is not allowed.
    fn apply(self, event: Self::Event) -> Result<Applied<Self>, InvalidTransitionError> {
        let next = self.transition(event)?;
        if next == self {
            Ok(Applied::Unchanged)
        } else {
            Ok(Applied::Changed(next))
        }
    }

    /// Applies the move to `status` as reported by a status event.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransitionError`] if `status` is not reachable.
    fn advance_to(self, status: Self) -> Result<Applied<Self>, InvalidTransitionError> {
        match Self::event_for(status) {
            Some(event) => self.apply(event),
            None if status == self => Ok(Applied::Unchanged),
            None => Err(InvalidTransitionError::new(Self::MACHINE, self, status)),
        }
    }
}

/// Canonical payload of a `status` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPayload<S> {
    /// The state after the transition.
    pub status: S,

    /// The state before the transition, when the publisher knows it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<S>,
}

impl<S> StatusPayload<S>
where
    S: Lifecycle + Serialize + DeserializeOwned,
{
    /// Payload for a validated move from `previous` to `status`.
    #[must_use]
    pub fn transition(previous: S, status: S) -> Self {
        Self {
            status,
            previous: Some(previous),
        }
    }

    /// Parses the payload of a delivered event.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::InvalidPayload`] if the value has no valid status.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, SdkError> {
        serde_json::from_value(value.clone())
            .map_err(|e| SdkError::InvalidPayload(e.to_string()))
    }

    /// Serializes the payload.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// The event that produces `status`, if any.
    #[must_use]
    pub fn event(&self) -> Option<S::Event> {
        S::event_for(self.status)
    }
}
