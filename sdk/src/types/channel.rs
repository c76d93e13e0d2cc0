//! Channel names.
//!
//! Channels follow the `entityType:entityId[:subresource]` convention, e.g.
//! `order:123`, `user:42:notifications`, `chat:session:42`, `admin:orders`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Maximum length of a channel name in bytes.
pub const MAX_CHANNEL_LEN: usize = 256;

/// Errors produced when parsing a channel name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelNameError {
    /// The name is empty.
    #[error("channel name cannot be empty")]
    Empty,

    /// The name exceeds [`MAX_CHANNEL_LEN`].
    #[error("channel name exceeds {MAX_CHANNEL_LEN} bytes")]
    TooLong,

    /// The name has fewer than two segments or an empty segment.
    #[error("malformed channel name: {0}")]
    Malformed(String),
}

/// A validated logical channel name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelName(String);

impl ChannelName {
    /// Parses and validates a channel name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name does not follow the
    /// `entityType:entityId[:subresource]` convention.
    pub fn parse(name: impl Into<String>) -> Result<Self, ChannelNameError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ChannelNameError::Empty);
        }
        if name.len() > MAX_CHANNEL_LEN {
            return Err(ChannelNameError::TooLong);
        }
        if name.chars().any(char::is_whitespace) {
            return Err(ChannelNameError::Malformed(name));
        }

        let mut segments = 0usize;
        for segment in name.split(':') {
            if segment.is_empty() {
                return Err(ChannelNameError::Malformed(name));
            }
            segments += 1;
        }
        if segments < 2 {
            return Err(ChannelNameError::Malformed(name));
        }

        Ok(Self(name))
    }

    /// `order:{order_id}`
    #[must_use]
    pub fn order(order_id: impl fmt::Display) -> Self {
        Self(format!("order:{order_id}"))
    }

    /// `user:{user_id}:notifications`
    #[must_use]
    pub fn user_notifications(user_id: impl fmt::Display) -> Self {
        Self(format!("user:{user_id}:notifications"))
    }

    /// `chat:session:{session_id}`
    #[must_use]
    pub fn chat_session(session_id: impl fmt::Display) -> Self {
        Self(format!("chat:session:{session_id}"))
    }

    /// `product:{product_id}`
    #[must_use]
    pub fn product(product_id: impl fmt::Display) -> Self {
        Self(format!("product:{product_id}"))
    }

    /// `verification:{request_id}`
    #[must_use]
    pub fn verification(request_id: impl fmt::Display) -> Self {
        Self(format!("verification:{request_id}"))
    }

    /// The admin-wide order feed.
    #[must_use]
    pub fn admin_orders() -> Self {
        Self("admin:orders".to_string())
    }

    /// Returns the channel name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the entity type (first segment).
    #[must_use]
    pub fn entity_type(&self) -> &str {
        self.0.split(':').next().unwrap_or_default()
    }

    /// Returns the entity id (second segment).
    #[must_use]
    pub fn entity_id(&self) -> &str {
        self.0.split(':').nth(1).unwrap_or_default()
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ChannelName {
    type Err = ChannelNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ChannelName {
    type Error = ChannelNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ChannelName> for String {
    fn from(name: ChannelName) -> Self {
        name.0
    }
}

impl AsRef<str> for ChannelName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
