//! Core types for the realtime feed client

pub mod client;
pub mod errors;
pub mod subscription;

pub use errors::{FeedError, FeedErrorType, Result};
