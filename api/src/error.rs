//! Relay error type and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use storefront_realtime_sdk::types::{ChannelNameError, InvalidTransitionError};
use storefront_realtime_sdk::ws::messages::{
    INVALID_MESSAGE, INVALID_TRANSITION, PUBLISH_REJECTED, SUBSCRIBE_REJECTED,
};

/// Errors returned by relay operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The channel name is malformed.
    #[error(transparent)]
    InvalidChannel(#[from] ChannelNameError),

    /// The payload does not match the event type.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The status event is not a valid lifecycle transition.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransitionError),

    /// The caller may not subscribe to the channel.
    #[error("subscription not allowed: {0}")]
    SubscribeForbidden(String),

    /// The caller may not publish to the channel.
    #[error("publish not allowed: {0}")]
    PublishForbidden(String),
}

impl ApiError {
    /// Returns the HTTP status for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidChannel(_) | Self::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            Self::InvalidTransition(_) => StatusCode::CONFLICT,
            Self::SubscribeForbidden(_) | Self::PublishForbidden(_) => StatusCode::FORBIDDEN,
        }
    }

    /// Returns the wire error code used in WebSocket error frames.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidChannel(_) | Self::InvalidPayload(_) => INVALID_MESSAGE,
            Self::InvalidTransition(_) => INVALID_TRANSITION,
            Self::SubscribeForbidden(_) => SUBSCRIBE_REJECTED,
            Self::PublishForbidden(_) => PUBLISH_REJECTED,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        }));

        (self.status_code(), body).into_response()
    }
}
