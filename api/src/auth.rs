//! Channel access rules.
//!
//! - `admin:*` requires the admin token.
//! - `user:{id}:*` requires the token `user:{id}` or the admin token.
//! - Every other channel is public to subscribe.
//!
//! Publishing is admin-only except on `chat:*`, where any identified user
//! may post.

use storefront_realtime_sdk::types::ChannelName;

/// Token prefix identifying a user.
pub const USER_TOKEN_PREFIX: &str = "user:";

/// Who is on the other end of a connection or request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Principal {
    /// No or unknown token.
    Anonymous,
    /// A signed-in customer.
    User(String),
    /// Holder of the admin token.
    Admin,
}

impl Principal {
    /// Returns true for the admin principal.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

/// Resolves tokens and checks channel access.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    admin_token: Option<String>,
}

impl AccessPolicy {
    /// Creates a policy. Admin channels stay closed when `admin_token` is
    /// `None`.
    #[must_use]
    pub fn new(admin_token: Option<String>) -> Self {
        Self { admin_token }
    }

    /// Resolves a token to a principal.
    #[must_use]
    pub fn resolve(&self, token: Option<&str>) -> Principal {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return Principal::Anonymous;
        };

        if self.admin_token.as_deref() == Some(token) {
            return Principal::Admin;
        }

        match token.strip_prefix(USER_TOKEN_PREFIX) {
            Some(user_id) if !user_id.is_empty() && !user_id.contains(':') => {
                Principal::User(user_id.to_string())
            }
            _ => Principal::Anonymous,
        }
    }

    /// Returns true if `principal` may subscribe to `channel`.
    #[must_use]
    pub fn can_subscribe(&self, principal: &Principal, channel: &ChannelName) -> bool {
        match channel.entity_type() {
            "admin" => principal.is_admin(),
            "user" => match principal {
                Principal::Admin => true,
                Principal::User(id) => id == channel.entity_id(),
                Principal::Anonymous => false,
            },
            _ => true,
        }
    }

    /// Returns true if `principal` may publish to `channel`.
    #[must_use]
    pub fn can_publish(&self, principal: &Principal, channel: &ChannelName) -> bool {
        match principal {
            Principal::Admin => true,
            Principal::User(_) => channel.entity_type() == "chat",
            Principal::Anonymous => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> AccessPolicy {
        AccessPolicy::new(Some("secret".to_string()))
    }

    #[test]
    fn test_resolve_tokens() {
        let policy = policy();
        assert_eq!(policy.resolve(None), Principal::Anonymous);
        assert_eq!(policy.resolve(Some("")), Principal::Anonymous);
        assert_eq!(policy.resolve(Some("secret")), Principal::Admin);
        assert_eq!(
            policy.resolve(Some("user:42")),
            Principal::User("42".to_string())
        );
        assert_eq!(policy.resolve(Some("user:")), Principal::Anonymous);
        assert_eq!(policy.resolve(Some("user:42:x")), Principal::Anonymous);
        assert_eq!(policy.resolve(Some("guess")), Principal::Anonymous);
    }

    #[test]
    fn test_no_admin_token_configured() {
        let policy = AccessPolicy::default();
        assert_eq!(policy.resolve(Some("secret")), Principal::Anonymous);
        assert!(!policy.can_subscribe(&Principal::Anonymous, &ChannelName::admin_orders()));
    }

    #[test]
    fn test_subscribe_rules() {
        let policy = policy();
        let alice = Principal::User("42".to_string());
        let bob = Principal::User("7".to_string());
        let notifications = ChannelName::user_notifications("42");

        assert!(policy.can_subscribe(&Principal::Anonymous, &ChannelName::order("1")));
        assert!(policy.can_subscribe(&Principal::Anonymous, &ChannelName::chat_session("9")));

        assert!(!policy.can_subscribe(&Principal::Anonymous, &ChannelName::admin_orders()));
        assert!(!policy.can_subscribe(&alice, &ChannelName::admin_orders()));
        assert!(policy.can_subscribe(&Principal::Admin, &ChannelName::admin_orders()));

        assert!(policy.can_subscribe(&alice, &notifications));
        assert!(!policy.can_subscribe(&bob, &notifications));
        assert!(!policy.can_subscribe(&Principal::Anonymous, &notifications));
        assert!(policy.can_subscribe(&Principal::Admin, &notifications));
    }

    #[test]
    fn test_publish_rules() {
        let policy = policy();
        let alice = Principal::User("42".to_string());

        assert!(policy.can_publish(&Principal::Admin, &ChannelName::order("1")));
        assert!(policy.can_publish(&alice, &ChannelName::chat_session("9")));
        assert!(!policy.can_publish(&alice, &ChannelName::order("1")));
        assert!(!policy.can_publish(&Principal::Anonymous, &ChannelName::chat_session("9")));
    }
}
