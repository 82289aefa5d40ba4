//! Connection lifecycle types shared by the STOMP session and the feed client.
//!
//! - [`FeedConnectionState`] - where the feed client is in its lifecycle
//! - [`ConnectionDetails`] - what the server reported in its CONNECTED frame
use std::fmt;

/// Connection state of a feed client.
///
/// `Idle -> Connecting -> Connected -> Subscribed` on the happy path,
/// `Connecting -> Failed` when the handshake fails. A fresh `connect` is
/// allowed from `Failed`; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedConnectionState {
    /// Client was created and `connect` has not been called yet.
    Idle,
    /// Transport is being opened or the STOMP handshake is in flight.
    Connecting,
    /// The server accepted the session; the subscription is not set up yet.
    Connected,
    /// The fixed topic is subscribed and messages are being rendered.
    Subscribed,
    /// The connect attempt or the session failed.
    Failed,
    /// The client was closed and cannot be used anymore.
    Closed,
}

impl FeedConnectionState {
    /// Whether `connect` may be called in this state.
    pub fn can_connect(&self) -> bool {
        matches!(self, FeedConnectionState::Idle | FeedConnectionState::Failed)
    }

    /// Whether a live session exists in this state.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            FeedConnectionState::Connected | FeedConnectionState::Subscribed
        )
    }
}

impl fmt::Display for FeedConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedConnectionState::Idle => write!(f, "IDLE"),
            FeedConnectionState::Connecting => write!(f, "CONNECTING"),
            FeedConnectionState::Connected => write!(f, "CONNECTED"),
            FeedConnectionState::Subscribed => write!(f, "SUBSCRIBED"),
            FeedConnectionState::Failed => write!(f, "FAILED"),
            FeedConnectionState::Closed => write!(f, "CLOSED"),
        }
    }
}

/// Connection details that can be used for debugging or logging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionDetails {
    /// STOMP protocol version negotiated with the server.
    pub protocol_version: Option<String>,
    /// Server name and version, as sent in the `server` header.
    pub server: Option<String>,
    /// Session identifier assigned by the server.
    pub session: Option<String>,
    /// Heart-beat values requested by the server, in milliseconds
    /// (`(can send, wants to receive)`).
    pub server_heartbeat: (u64, u64),
}

/// Callback type for connection state changes.
/// Takes references to the new and previous states.
pub type ConnectionStateChangeListener =
    Box<dyn Fn(&FeedConnectionState, &FeedConnectionState) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_display() {
        assert_eq!(FeedConnectionState::Idle.to_string(), "IDLE");
        assert_eq!(FeedConnectionState::Connecting.to_string(), "CONNECTING");
        assert_eq!(FeedConnectionState::Subscribed.to_string(), "SUBSCRIBED");
        assert_eq!(FeedConnectionState::Failed.to_string(), "FAILED");
    }

    #[test]
    fn test_can_connect() {
        assert!(FeedConnectionState::Idle.can_connect());
        assert!(FeedConnectionState::Failed.can_connect());
        assert!(!FeedConnectionState::Connecting.can_connect());
        assert!(!FeedConnectionState::Connected.can_connect());
        assert!(!FeedConnectionState::Subscribed.can_connect());
        assert!(!FeedConnectionState::Closed.can_connect());
    }

    #[test]
    fn test_is_live() {
        assert!(FeedConnectionState::Connected.is_live());
        assert!(FeedConnectionState::Subscribed.is_live());
        assert!(!FeedConnectionState::Failed.is_live());
    }
}
