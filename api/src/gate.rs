//! Server-side lifecycle validation.
//!
//! Status publishes are checked against the last accepted state of the
//! order or verification request before they are fanned out. Accepted
//! payloads are rewritten to the canonical form carrying `previous`.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use serde_json::Value;
use storefront_realtime_sdk::realtime::bridge::CREATED_EVENT_TYPE;
use storefront_realtime_sdk::types::{
    Applied, ChannelName, Lifecycle, OrderStatus, StatusPayload, VerificationStatus,
    VerificationUpdate, STATUS_EVENT_TYPE, VERIFICATION_EVENT_TYPE,
};
use tracing::{debug, warn};

use crate::error::ApiError;

/// Outcome of a publish passing the gate.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// Publish this payload.
    Accept(Value),
    /// The entity is already in the reported state; nothing to publish.
    Duplicate,
}

/// Terminal entities kept per machine before the oldest are forgotten.
pub const DEFAULT_TERMINAL_RETENTION: usize = 10_000;

/// Last accepted state per entity id.
///
/// Entities in a non-terminal state are kept until they finish. Terminal
/// ones are kept up to `retain_terminal`, oldest evicted first; an evicted
/// id is treated as unknown again, so a late update for it is validated
/// from the initial state.
#[derive(Debug)]
struct Ledger<S> {
    states: HashMap<String, S>,
    terminal: VecDeque<String>,
    retain_terminal: usize,
}

impl<S: Lifecycle> Ledger<S> {
    fn new(retain_terminal: usize) -> Self {
        Self {
            states: HashMap::new(),
            terminal: VecDeque::new(),
            retain_terminal,
        }
    }

    fn get(&self, id: &str) -> Option<S> {
        self.states.get(id).copied()
    }

    fn record(&mut self, id: &str, state: S) {
        self.states.insert(id.to_string(), state);
        if !state.is_terminal() {
            return;
        }

        self.terminal.push_back(id.to_string());
        while self.terminal.len() > self.retain_terminal {
            if let Some(evicted) = self.terminal.pop_front() {
                self.states.remove(&evicted);
            }
        }
    }
}

/// Tracks the last accepted lifecycle state per entity.
#[derive(Debug)]
pub struct TransitionGate {
    orders: Mutex<Ledger<OrderStatus>>,
    verifications: Mutex<Ledger<VerificationStatus>>,
}

impl Default for TransitionGate {
    fn default() -> Self {
        Self::with_terminal_retention(DEFAULT_TERMINAL_RETENTION)
    }
}

impl TransitionGate {
    /// Creates an empty gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a gate that remembers at most `retain` finished entities per
    /// machine.
    #[must_use]
    pub fn with_terminal_retention(retain: usize) -> Self {
        Self {
            orders: Mutex::new(Ledger::new(retain)),
            verifications: Mutex::new(Ledger::new(retain)),
        }
    }

    /// Checks a publish and records the new state when accepted.
    ///
    /// Events other than order `status`, `verification` and admin `created`
    /// pass through untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidPayload`] if a lifecycle payload does not
    /// parse and [`ApiError::InvalidTransition`] if the edge is not allowed.
    pub fn admit(
        &self,
        channel: &ChannelName,
        event_type: &str,
        payload: Value,
    ) -> Result<Admission, ApiError> {
        match (channel.entity_type(), event_type) {
            ("order", STATUS_EVENT_TYPE) => self.admit_order(channel.entity_id(), &payload),
            (_, VERIFICATION_EVENT_TYPE) => self.admit_verification(payload),
            ("admin", CREATED_EVENT_TYPE) => {
                if let Some(order_id) = payload.get("order_id").and_then(Value::as_str) {
                    let mut orders = self.orders.lock();
                    if orders.get(order_id).is_none() {
                        orders.record(order_id, OrderStatus::Pending);
                    }
                }
                Ok(Admission::Accept(payload))
            }
            _ => Ok(Admission::Accept(payload)),
        }
    }

    /// Returns the last accepted status of an order.
    #[must_use]
    pub fn order_status(&self, order_id: &str) -> Option<OrderStatus> {
        self.orders.lock().get(order_id)
    }

    /// Returns the last accepted status of a verification request.
    #[must_use]
    pub fn verification_status(&self, request_id: &str) -> Option<VerificationStatus> {
        self.verifications.lock().get(request_id)
    }

    fn admit_order(&self, order_id: &str, payload: &Value) -> Result<Admission, ApiError> {
        let reported = StatusPayload::<OrderStatus>::from_value(payload)
            .map_err(|e| ApiError::InvalidPayload(e.to_string()))?;

        let mut orders = self.orders.lock();
        let current = orders.get(order_id).unwrap_or(OrderStatus::Pending);

        match current.advance_to(reported.status) {
            Ok(Applied::Changed(next)) => {
                orders.record(order_id, next);
                debug!(order_id, from = %current, to = %next, "order transition accepted");
                Ok(Admission::Accept(
                    StatusPayload::transition(current, next).to_value(),
                ))
            }
            Ok(Applied::Unchanged) => Ok(Admission::Duplicate),
            Err(error) => {
                warn!(order_id, %error, "order transition refused");
                Err(error.into())
            }
        }
    }

    fn admit_verification(&self, payload: Value) -> Result<Admission, ApiError> {
        let update: VerificationUpdate = serde_json::from_value(payload)
            .map_err(|e| ApiError::InvalidPayload(e.to_string()))?;

        let mut verifications = self.verifications.lock();
        let current = verifications
            .get(&update.request_id)
            .unwrap_or(VerificationStatus::Unsubmitted);

        match current.advance_to(update.status) {
            Ok(Applied::Changed(next)) => {
                verifications.record(&update.request_id, next);
                debug!(request_id = %update.request_id, from = %current, to = %next, "verification transition accepted");
                let payload = serde_json::to_value(&update)
                    .map_err(|e| ApiError::InvalidPayload(e.to_string()))?;
                Ok(Admission::Accept(payload))
            }
            Ok(Applied::Unchanged) => Ok(Admission::Duplicate),
            Err(error) => {
                warn!(request_id = %update.request_id, %error, "verification transition refused");
                Err(error.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn status(status: &str) -> Value {
        json!({ "status": status })
    }

    #[test]
    fn test_order_transitions() {
        let gate = TransitionGate::new();
        let channel = ChannelName::order("1042");

        let admitted = gate
            .admit(&channel, STATUS_EVENT_TYPE, status("confirmed"))
            .expect("admit");
        assert_eq!(
            admitted,
            Admission::Accept(json!({ "status": "confirmed", "previous": "pending" }))
        );
        assert_eq!(gate.order_status("1042"), Some(OrderStatus::Confirmed));

        assert_eq!(
            gate.admit(&channel, STATUS_EVENT_TYPE, status("confirmed")),
            Ok(Admission::Duplicate)
        );
        assert!(matches!(
            gate.admit(&channel, STATUS_EVENT_TYPE, status("pending")),
            Err(ApiError::InvalidTransition(_))
        ));
        assert_eq!(gate.order_status("1042"), Some(OrderStatus::Confirmed));
    }

    #[test]
    fn test_terminal_order_refuses_moves() {
        let gate = TransitionGate::new();
        let channel = ChannelName::order("7");

        assert!(gate
            .admit(&channel, STATUS_EVENT_TYPE, status("cancelled"))
            .is_ok());
        assert!(matches!(
            gate.admit(&channel, STATUS_EVENT_TYPE, status("shipped")),
            Err(ApiError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_malformed_status_payload() {
        let gate = TransitionGate::new();
        assert!(matches!(
            gate.admit(&ChannelName::order("1"), STATUS_EVENT_TYPE, json!({ "state": "x" })),
            Err(ApiError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_verification_transitions() {
        let gate = TransitionGate::new();
        let channel = ChannelName::user_notifications("42");
        let update = |status: &str| json!({ "request_id": "r1", "status": status });

        assert!(gate
            .admit(&channel, VERIFICATION_EVENT_TYPE, update("pending"))
            .is_ok());
        assert!(gate
            .admit(&channel, VERIFICATION_EVENT_TYPE, update("rejected"))
            .is_ok());
        assert!(matches!(
            gate.admit(&channel, VERIFICATION_EVENT_TYPE, update("verified")),
            Err(ApiError::InvalidTransition(_))
        ));
        assert_eq!(
            gate.verification_status("r1"),
            Some(VerificationStatus::Rejected)
        );

        // a resubmission is a new request
        let resubmitted = json!({ "request_id": "r2", "status": "pending" });
        assert!(gate
            .admit(&channel, VERIFICATION_EVENT_TYPE, resubmitted)
            .is_ok());
    }

    #[test]
    fn test_other_events_pass_through() {
        let gate = TransitionGate::new();
        let payload = json!({ "sender_id": "7", "body": "Hallo" });
        assert_eq!(
            gate.admit(&ChannelName::chat_session("9"), "message", payload.clone()),
            Ok(Admission::Accept(payload))
        );
    }

    #[test]
    fn test_terminal_entries_are_bounded() {
        let gate = TransitionGate::with_terminal_retention(1);

        for id in ["1", "2"] {
            assert!(gate
                .admit(&ChannelName::order(id), STATUS_EVENT_TYPE, status("cancelled"))
                .is_ok());
        }
        assert!(gate
            .admit(&ChannelName::order("3"), STATUS_EVENT_TYPE, status("confirmed"))
            .is_ok());

        assert_eq!(gate.order_status("1"), None);
        assert_eq!(gate.order_status("2"), Some(OrderStatus::Cancelled));
        assert_eq!(gate.order_status("3"), Some(OrderStatus::Confirmed));
    }

    #[test]
    fn test_created_registers_order() {
        let gate = TransitionGate::new();
        assert!(gate
            .admit(
                &ChannelName::admin_orders(),
                CREATED_EVENT_TYPE,
                json!({ "order_id": "55" })
            )
            .is_ok());
        assert_eq!(gate.order_status("55"), Some(OrderStatus::Pending));
    }
}
