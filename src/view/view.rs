//! View surface the feed client renders into.
//!
//! The surface has two elements:
//! - a status indicator, visible while connecting and turned into an error
//!   banner when the connection fails
//! - a message log, one entry per received message, newest last
//!
//! # Examples
//!
//! ```rust
//! use realtime_feed_rs::view::{FeedView, PageView, StatusStyle};
//!
//! let view = PageView::new(None);
//! view.append_entry("{\"content\":\"hi\"}".to_string());
//! view.hide_status();
//!
//! assert_eq!(view.entries().len(), 1);
//! assert!(view.status().hidden);
//! assert_eq!(view.status().style, StatusStyle::Normal);
//! ```

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::stomp::config::FeedClientConfig;

/// Status text shown when the connection cannot be established
pub const FAILURE_MESSAGE: &str =
    "Could not connect to WebSocket server. Please refresh this page to try again!";

/// Status text shown until the connection is established
pub const CONNECTING_MESSAGE: &str = "Connecting...";

/// Sink for everything the feed client displays
pub trait FeedView: Send + Sync + 'static {
    /// Hides the status indicator
    fn hide_status(&self);

    /// Shows `text` in the status indicator, styled as an error
    fn show_status_error(&self, text: &str);

    /// Appends an entry to the end of the log and scrolls to it
    fn append_entry(&self, text: String);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusStyle {
    Normal,
    Error,
}

/// The "connecting" status element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusIndicator {
    pub hidden: bool,
    pub text: String,
    pub style: StatusStyle,
}

impl Default for StatusIndicator {
    fn default() -> Self {
        Self {
            hidden: false,
            text: CONNECTING_MESSAGE.to_string(),
            style: StatusStyle::Normal,
        }
    }
}

impl StatusIndicator {
    pub fn hide(&mut self) {
        self.hidden = true;
    }

    /// Errors are always made visible, even after the indicator was hidden
    /// by a successful connect.
    pub fn show_error(&mut self, text: &str) {
        self.hidden = false;
        self.text = text.to_string();
        self.style = StatusStyle::Error;
    }
}

/// One rendered message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEntry {
    /// Arrival order, starting at 0; keeps counting across evictions
    pub sequence: u64,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

/// Append-only message log with an optional cap.
///
/// When the cap is reached the oldest entries are evicted.
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    entries: VecDeque<RenderedEntry>,
    max_entries: Option<usize>,
    next_sequence: u64,
    scroll_top: usize,
}

impl MessageLog {
    pub fn new(max_entries: Option<usize>) -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries,
            next_sequence: 0,
            scroll_top: 0,
        }
    }

    pub fn append(&mut self, text: String) -> &RenderedEntry {
        self.entries.push_back(RenderedEntry {
            sequence: self.next_sequence,
            text,
            received_at: Utc::now(),
        });
        self.next_sequence += 1;

        if let Some(max) = self.max_entries {
            while self.entries.len() > max.max(1) {
                self.entries.pop_front();
            }
        }

        &self.entries[self.entries.len() - 1]
    }

    /// Moves the scroll position to the newest entry
    pub fn scroll_to_latest(&mut self) {
        self.scroll_top = self.entries.len().saturating_sub(1);
    }

    /// Index of the entry the log is scrolled to
    pub fn scroll_top(&self) -> usize {
        self.scroll_top
    }

    pub fn entries(&self) -> impl Iterator<Item = &RenderedEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&RenderedEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// In-memory page holding the status indicator and the message log
#[derive(Debug, Default)]
pub struct PageView {
    status: RwLock<StatusIndicator>,
    log: RwLock<MessageLog>,
}

impl PageView {
    pub fn new(max_entries: Option<usize>) -> Self {
        Self {
            status: RwLock::new(StatusIndicator::default()),
            log: RwLock::new(MessageLog::new(max_entries)),
        }
    }

    pub fn from_config(config: &FeedClientConfig) -> Self {
        Self::new(config.max_log_entries)
    }

    /// Snapshot of the status indicator
    pub fn status(&self) -> StatusIndicator {
        read(&self.status).clone()
    }

    /// Snapshot of the log entries, oldest first
    pub fn entries(&self) -> Vec<RenderedEntry> {
        read(&self.log).entries().cloned().collect()
    }

    pub fn scroll_top(&self) -> usize {
        read(&self.log).scroll_top()
    }
}

impl FeedView for PageView {
    fn hide_status(&self) {
        write(&self.status).hide();
    }

    fn show_status_error(&self, text: &str) {
        write(&self.status).show_error(text);
    }

    fn append_entry(&self, text: String) {
        let mut log = write(&self.log);
        log.append(text);
        log.scroll_to_latest();
    }
}

// a panicking writer leaves the view readable
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_defaults_to_connecting() {
        let status = StatusIndicator::default();
        assert!(!status.hidden);
        assert_eq!(status.text, CONNECTING_MESSAGE);
        assert_eq!(status.style, StatusStyle::Normal);
    }

    #[test]
    fn test_show_error_unhides() {
        let mut status = StatusIndicator::default();
        status.hide();
        status.show_error(FAILURE_MESSAGE);
        assert!(!status.hidden);
        assert_eq!(status.text, FAILURE_MESSAGE);
        assert_eq!(status.style, StatusStyle::Error);
    }

    #[test]
    fn test_log_keeps_arrival_order() {
        let mut log = MessageLog::new(None);
        for i in 0..5 {
            log.append(format!("m{}", i));
        }
        let texts: Vec<_> = log.entries().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["m0", "m1", "m2", "m3", "m4"]);
        assert_eq!(log.latest().unwrap().sequence, 4);
    }

    #[test]
    fn test_log_cap_evicts_oldest() {
        let mut log = MessageLog::new(Some(2));
        log.append("a".to_string());
        log.append("b".to_string());
        let newest = log.append("c".to_string()).sequence;

        assert_eq!(newest, 2);
        assert_eq!(log.len(), 2);
        let texts: Vec<_> = log.entries().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["b", "c"]);
    }

    #[test]
    fn test_scroll_to_latest() {
        let mut log = MessageLog::new(None);
        log.scroll_to_latest();
        assert_eq!(log.scroll_top(), 0);
        log.append("a".to_string());
        log.append("b".to_string());
        log.scroll_to_latest();
        assert_eq!(log.scroll_top(), 1);
    }

    #[test]
    fn test_page_view_scrolls_on_append() {
        let view = PageView::new(None);
        view.append_entry("a".to_string());
        view.append_entry("b".to_string());
        view.append_entry("c".to_string());
        assert_eq!(view.scroll_top(), 2);
        assert_eq!(view.entries().len(), 3);
    }
}
