//! Identity-verification lifecycle.
//!
//! `unsubmitted → pending → verified | rejected`. A rejected request is
//! never revived: resubmitting creates a new [`VerificationRequest`] that
//! links back to the rejected one.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::lifecycle::{Applied, InvalidTransitionError, Lifecycle};
use crate::error::SdkError;

/// Event type carrying [`VerificationUpdate`] payloads on a user's
/// notification channel.
pub const VERIFICATION_EVENT_TYPE: &str = "verification";

/// Verification status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    /// No documents submitted yet.
    Unsubmitted,
    /// Submitted, awaiting review.
    Pending,
    /// Approved by a reviewer.
    Verified,
    /// Declined by a reviewer.
    Rejected,
}

impl VerificationStatus {
    const ALL: [Self; 4] = [
        Self::Unsubmitted,
        Self::Pending,
        Self::Verified,
        Self::Rejected,
    ];

    /// Display label shown to users.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Unsubmitted => "Nicht eingereicht",
            Self::Pending => "In Prüfung",
            Self::Verified => "Verifiziert",
            Self::Rejected => "Abgelehnt",
        }
    }

    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unsubmitted => "unsubmitted",
            Self::Pending => "pending",
            Self::Verified => "verified",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationStatus {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| SdkError::UnknownVariant {
                kind: "verification status",
                value: s.to_string(),
            })
    }
}

/// Events that drive a verification request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationEvent {
    /// Documents submitted.
    Submit,
    /// Reviewer approved.
    Approve,
    /// Reviewer declined.
    Reject,
}

impl VerificationEvent {
    const ALL: [Self; 3] = [Self::Submit, Self::Approve, Self::Reject];

    /// The status this event moves to.
    #[must_use]
    pub const fn target(&self) -> VerificationStatus {
        match self {
            Self::Submit => VerificationStatus::Pending,
            Self::Approve => VerificationStatus::Verified,
            Self::Reject => VerificationStatus::Rejected,
        }
    }

    /// The event that moves a request to `status`.
    #[must_use]
    pub const fn for_target(status: VerificationStatus) -> Option<Self> {
        match status {
            VerificationStatus::Unsubmitted => None,
            VerificationStatus::Pending => Some(Self::Submit),
            VerificationStatus::Verified => Some(Self::Approve),
            VerificationStatus::Rejected => Some(Self::Reject),
        }
    }

    /// Wire name of the event.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

impl fmt::Display for VerificationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationEvent {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| SdkError::UnknownVariant {
                kind: "verification event",
                value: s.to_string(),
            })
    }
}

impl Lifecycle for VerificationStatus {
    type Event = VerificationEvent;

    const MACHINE: &'static str = "verification";

    fn transition(self, event: VerificationEvent) -> Result<Self, InvalidTransitionError> {
        let target = event.target();
        if target == self {
            return Ok(self);
        }

        match (self, event) {
            (Self::Unsubmitted, VerificationEvent::Submit)
            | (Self::Pending, VerificationEvent::Approve | VerificationEvent::Reject) => {
                Ok(target)
            }
            _ => Err(InvalidTransitionError::new(Self::MACHINE, self, event)),
        }
    }

    fn is_terminal(self) -> bool {
        matches!(self, Self::Verified | Self::Rejected)
    }

    fn event_for(status: Self) -> Option<VerificationEvent> {
        VerificationEvent::for_target(status)
    }
}

/// One verification attempt by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRequest {
    /// Request id.
    pub id: String,

    /// User the request belongs to.
    pub user_id: String,

    /// Current status.
    pub status: VerificationStatus,

    /// The rejected request this one resubmits, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,

    /// Every earlier request in this chain, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub superseded: Vec<String>,

    /// Reviewer note attached to a rejection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl VerificationRequest {
    /// Creates an unsubmitted request for a user.
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            status: VerificationStatus::Unsubmitted,
            previous: None,
            superseded: Vec::new(),
            reason: None,
            created_at: Utc::now(),
        }
    }

    /// Applies an event to this request.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransitionError`] if the edge is not allowed; the
    /// request is left unchanged.
    pub fn apply(
        &mut self,
        event: VerificationEvent,
    ) -> Result<VerificationStatus, InvalidTransitionError> {
        self.status = self.status.transition(event)?;
        Ok(self.status)
    }

    /// Starts a new request after a rejection.
    ///
    /// The new request is `pending` and references this one.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransitionError`] unless this request is `rejected`.
    pub fn resubmit(&self) -> Result<Self, InvalidTransitionError> {
        if self.status != VerificationStatus::Rejected {
            return Err(InvalidTransitionError::new(
                VerificationStatus::MACHINE,
                self.status,
                "resubmit",
            ));
        }

        let mut superseded = self.superseded.clone();
        superseded.push(self.id.clone());

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            user_id: self.user_id.clone(),
            status: VerificationStatus::Pending,
            previous: Some(self.id.clone()),
            superseded,
            reason: None,
            created_at: Utc::now(),
        })
    }
}

/// Payload of a `verification` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationUpdate {
    /// Request the update belongs to.
    pub request_id: String,

    /// New status of that request.
    pub status: VerificationStatus,

    /// Reviewer note, for rejections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl VerificationRequest {
    /// Applies an update reported for this request or for its resubmission.
    ///
    /// An update for a different request is accepted only as the `pending`
    /// resubmission of a rejected request; this request is then replaced.
    /// Updates for a request already superseded in this chain are refused.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransitionError`] if the update is not reachable
    /// from the current state; the request is left unchanged.
    pub fn apply_update(
        &mut self,
        update: &VerificationUpdate,
    ) -> Result<Applied<VerificationStatus>, InvalidTransitionError> {
        if update.request_id != self.id {
            if update.status != VerificationStatus::Pending
                || self.superseded.contains(&update.request_id)
            {
                return Err(InvalidTransitionError::new(
                    VerificationStatus::MACHINE,
                    self.status,
                    format!("{} for request {}", update.status, update.request_id),
                ));
            }
            let mut next = self.resubmit()?;
            next.id.clone_from(&update.request_id);
            *self = next;
            return Ok(Applied::Changed(VerificationStatus::Pending));
        }

        let applied = self.status.advance_to(update.status)?;
        if let Applied::Changed(next) = applied {
            self.status = next;
            if next == VerificationStatus::Rejected {
                self.reason.clone_from(&update.reason);
            }
        }
        Ok(applied)
    }
}
