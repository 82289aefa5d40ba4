//! Realtime feed client and the payloads it handles.

pub mod messages;
mod feed;

pub use messages::{render_payload, FeedMessage};
pub use feed::{RealtimeFeedClient, PUBLIC_TOPIC, SEND_DESTINATION};
