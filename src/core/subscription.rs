use std::fmt;

/// Subscription state that can be used to check if a subscription still
/// receives messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// SUBSCRIBE was sent; messages for this subscription are delivered.
    Active,
    /// UNSUBSCRIBE was sent or the connection went away.
    Cancelled,
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionState::Active => write!(f, "ACTIVE"),
            SubscriptionState::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// A (connection, destination) binding recorded when subscribe succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSubscription {
    /// Connection-unique id, sent as the STOMP `id` header.
    pub id: String,
    /// Destination the subscription is bound to.
    pub destination: String,
    pub state: SubscriptionState,
}

impl FeedSubscription {
    pub fn new(id: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            destination: destination.into(),
            state: SubscriptionState::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == SubscriptionState::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_state_display() {
        assert_eq!(SubscriptionState::Active.to_string(), "ACTIVE");
        assert_eq!(SubscriptionState::Cancelled.to_string(), "CANCELLED");
    }

    #[test]
    fn test_new_subscription_is_active() {
        let sub = FeedSubscription::new("sub-0", "/public");
        assert!(sub.is_active());
        assert_eq!(sub.destination, "/public");
    }
}
