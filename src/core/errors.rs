use serde::{Deserialize, Serialize};
use thiserror::Error;
use std::fmt;

/// Error type that represents the different kinds of failures
/// a feed client can run into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedErrorType {
    /// An unknown error occurred
    Unknown,
    /// The transport or the STOMP handshake did not complete
    ConnectFailure,
    /// An established session was torn down by the server or the network
    ConnectionLost,
    /// Received payload could not be parsed or failed validation
    InvalidMessage,
    /// A frame violated the STOMP wire format
    Protocol,
    /// A timeout occurred while waiting for the server
    Timeout,
    /// The requested action is not valid in the current state
    BadAction,
}

/// Unified error type for everything that can go wrong in the feed client.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub struct FeedError {
    /// Type of the error
    pub error_type: FeedErrorType,
    /// Detailed error message
    pub message: String,
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.error_type, self.message)
    }
}

/// Type alias for common Result type used throughout the library
pub type Result<T> = std::result::Result<T, FeedError>;

/// Callback type for error listeners
pub type ErrorListener = Box<dyn Fn(&FeedError) + Send + Sync>;

impl FeedError {
    /// Creates a new FeedError with the given type and message
    pub fn new(error_type: FeedErrorType, message: impl Into<String>) -> Self {
        Self {
            error_type,
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(FeedErrorType::Protocol, message)
    }

    pub fn bad_action(message: impl Into<String>) -> Self {
        Self::new(FeedErrorType::BadAction, message)
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(FeedErrorType::InvalidMessage, err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for FeedError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::new(FeedErrorType::ConnectFailure, err.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for FeedError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Self::new(FeedErrorType::ConnectionLost, "Transport is closed")
    }
}
