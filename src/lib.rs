//! realtime-feed-rs: A Rust client for STOMP publish/subscribe feeds
//!
//! This library connects to a STOMP-over-WebSocket endpoint, subscribes to
//! the public topic and renders every message it receives into a view.
//!
//! ```no_run
//! use realtime_feed_rs::{FeedClientConfig, RealtimeFeedClient};
//!
//! # async fn run() -> realtime_feed_rs::Result<()> {
//! let config = FeedClientConfig::builder()
//!     .origin("ws://localhost:8080")
//!     .build();
//! let client = RealtimeFeedClient::with_websocket(config);
//! client.connect().await?;
//!
//! for entry in client.view().entries() {
//!     println!("{}", entry.text);
//! }
//! # Ok(())
//! # }
//! ```

#![allow(missing_docs)]

pub mod core;
pub mod feed;
pub mod stomp;
pub mod view;

/// Initialize logging with the default `tracing` subscriber.
///
/// Safe to call more than once; only the first call installs the subscriber.
pub fn init() {
    if tracing_subscriber::fmt().try_init().is_ok() {
        tracing::info!("realtime-feed-rs initialized");
    }
}

// Re-export main types for convenient usage
pub use crate::core::errors::{ErrorListener, FeedError, FeedErrorType, Result};
pub use crate::core::client::{
    ConnectionDetails, ConnectionStateChangeListener, FeedConnectionState,
};
pub use crate::core::subscription::{FeedSubscription, SubscriptionState};
pub use crate::feed::{FeedMessage, RealtimeFeedClient, PUBLIC_TOPIC, SEND_DESTINATION};
pub use crate::stomp::{
    FeedClientConfig, StompClient, TransportEvent, TransportFactory, TransportHandle,
    WebSocketConnector,
};
pub use crate::view::{FeedView, PageView, RenderedEntry, StatusIndicator, StatusStyle};
