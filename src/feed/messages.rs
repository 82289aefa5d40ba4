//! Payloads exchanged on the public topic.
//!
//! Inbound bodies are treated as opaque JSON documents and rendered verbatim;
//! [`FeedMessage`] is the shape the server broadcasts and accepts.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::{FeedError, FeedErrorType, Result};

/// Wire format of [`FeedMessage::timestamp`], e.g. `2018-10-09 00:12:12+0100`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%z";

/// Maximum number of characters in [`FeedMessage::content`]
pub const MAX_CONTENT_CHARS: usize = 100;

pub const CONTENT_SIZE_VIOLATION: &str =
    "Error: The size of the content must be between 1 and 100 chars";
pub const TIMESTAMP_VIOLATION: &str = "Error: Invalid timestamp format";

/// Message broadcast on the public topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedMessage {
    /// The content to be broadcast
    pub content: String,
    /// When the message was written, in [`TIMESTAMP_FORMAT`]
    pub timestamp: String,
}

impl FeedMessage {
    pub fn new(content: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            timestamp: timestamp.into(),
        }
    }

    /// Creates a message stamped with the current UTC time
    pub fn now(content: impl Into<String>) -> Self {
        Self::new(content, Utc::now().format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn parsed_timestamp(&self) -> Result<DateTime<FixedOffset>> {
        DateTime::parse_from_str(&self.timestamp, TIMESTAMP_FORMAT)
            .map_err(|e| FeedError::new(FeedErrorType::InvalidMessage, e.to_string()))
    }

    /// All constraint violations, in a stable order
    pub fn violations(&self) -> Vec<&'static str> {
        let mut violations = Vec::new();
        let chars = self.content.chars().count();
        if chars == 0 || chars > MAX_CONTENT_CHARS {
            violations.push(CONTENT_SIZE_VIOLATION);
        }
        if self.parsed_timestamp().is_err() {
            violations.push(TIMESTAMP_VIOLATION);
        }
        violations
    }

    pub fn validate(&self) -> Result<()> {
        let violations = self.violations();
        if violations.is_empty() {
            return Ok(());
        }
        Err(FeedError::new(
            FeedErrorType::InvalidMessage,
            violations.join("; "),
        ))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Parses an inbound body and renders it back as compact JSON.
///
/// Keys keep the order they had in `body`.
pub fn render_payload(body: &str) -> Result<String> {
    let value: Value = serde_json::from_str(body)?;
    Ok(serde_json::to_string(&value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_payload_keeps_key_order() {
        let rendered = render_payload(r#"{"sender":"alice","content":"hi"}"#).unwrap();
        assert_eq!(rendered, r#"{"sender":"alice","content":"hi"}"#);
    }

    #[test]
    fn test_render_payload_compacts_whitespace() {
        let rendered = render_payload("{ \"b\" : [1, 2],\n \"a\": null }").unwrap();
        assert_eq!(rendered, r#"{"b":[1,2],"a":null}"#);
    }

    #[test]
    fn test_render_payload_is_idempotent() {
        let once = render_payload(r#"{"z":{"y":true},"x":"é"}"#).unwrap();
        let twice = render_payload(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_render_payload_rejects_malformed() {
        let err = render_payload("not json").unwrap_err();
        assert_eq!(err.error_type, FeedErrorType::InvalidMessage);
    }

    #[test]
    fn test_valid_message() {
        let message = FeedMessage::new("abrakadabra", "2018-10-09 00:12:12+0100");
        assert!(message.validate().is_ok());
        let ts = message.parsed_timestamp().unwrap();
        assert_eq!(ts.offset().local_minus_utc(), 3600);
    }

    #[test]
    fn test_now_is_valid() {
        assert!(FeedMessage::now("hello").validate().is_ok());
    }

    #[test]
    fn test_content_size_bounds() {
        let ts = "2019-10-09 00:12:12+0100";
        assert_eq!(
            FeedMessage::new("", ts).violations(),
            vec![CONTENT_SIZE_VIOLATION]
        );
        assert!(FeedMessage::new("x".repeat(100), ts).violations().is_empty());
        assert_eq!(
            FeedMessage::new("x".repeat(101), ts).violations(),
            vec![CONTENT_SIZE_VIOLATION]
        );
    }

    #[test]
    fn test_invalid_timestamp() {
        let message = FeedMessage::new("hi", "2019-10-09T00:12:12+0100");
        assert_eq!(message.violations(), vec![TIMESTAMP_VIOLATION]);
    }

    #[test]
    fn test_all_violations_reported() {
        let err = FeedMessage::new("", "yesterday").validate().unwrap_err();
        assert_eq!(err.error_type, FeedErrorType::InvalidMessage);
        assert_eq!(
            err.message,
            format!("{}; {}", CONTENT_SIZE_VIOLATION, TIMESTAMP_VIOLATION)
        );
    }

    #[test]
    fn test_to_json_field_order() {
        let json = FeedMessage::new("hi", "2019-10-09 00:12:12+0100")
            .to_json()
            .unwrap();
        assert_eq!(json, r#"{"content":"hi","timestamp":"2019-10-09 00:12:12+0100"}"#);
    }
}
