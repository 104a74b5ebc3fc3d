pub mod telegram;

use std::fmt;

use async_trait::async_trait;

use crate::error::{DeliveryError, FetchError};

/// Content category of a source message, decided once when the message is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Media,
    Poll,
    Empty,
    /// Service messages (joins, pins, title changes, ...)
    Other,
}

/// A message read from the source chat.
///
/// The payload itself stays on the platform side; delivery copies it by id,
/// so nothing here is ever re-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMessage {
    /// Platform-assigned id, strictly increasing within the chat
    pub id: u64,
    pub kind: MessageKind,
    /// Chat the message was read from
    pub chat_id: i64,
    /// Short text excerpt for logs and dry-run reports
    pub preview: Option<String>,
}

impl SourceMessage {
    pub fn new(id: u64, kind: MessageKind, chat_id: i64) -> Self {
        Self {
            id,
            kind,
            chat_id,
            preview: None,
        }
    }

    pub fn with_preview(mut self, text: &str) -> Self {
        self.preview = Some(truncate_preview(text, 40));
        self
    }
}

fn truncate_preview(text: &str, max_chars: usize) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() <= max_chars {
        return line.to_string();
    }
    let mut out: String = line.chars().take(max_chars).collect();
    out.push('…');
    out
}

/// Opaque delivery target, e.g. a numeric chat id or a `@channel` username.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecipientId(String);

impl RecipientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecipientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for RecipientId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

/// One logical connection to the platform, opened and closed once per run.
#[async_trait]
pub trait Session: Send + Sync {
    async fn connect(&self) -> Result<(), FetchError>;

    async fn disconnect(&self);
}

#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Fetch at most `limit` of the most recent messages in `chat`, newest first.
    async fn fetch_recent(&self, chat: i64, limit: usize) -> Result<Vec<SourceMessage>, FetchError>;

    /// Called after the cursor has been persisted at `up_to`. Readers backed by a
    /// consumable queue drop everything at or below it here.
    async fn acknowledge(&self, _up_to: u64) {}
}

#[async_trait]
pub trait Deliverer: Send + Sync {
    /// Make a single send attempt. Retrying is the caller's business.
    async fn send(&self, recipient: &RecipientId, message: &SourceMessage)
        -> Result<(), DeliveryError>;
}

/// Everything a forwarding run needs from the platform.
pub trait Transport: Session + SourceReader + Deliverer {}

impl<T: Session + SourceReader + Deliverer + ?Sized> Transport for T {}

/// Order a batch newest first and keep only the `limit` most recent messages.
pub fn newest_first(mut messages: Vec<SourceMessage>, limit: usize) -> Vec<SourceMessage> {
    messages.sort_by(|a, b| b.id.cmp(&a.id));
    messages.dedup_by_key(|m| m.id);
    messages.truncate(limit);
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: u64) -> SourceMessage {
        SourceMessage::new(id, MessageKind::Text, -100)
    }

    #[test]
    fn test_newest_first_orders_descending() {
        let ids: Vec<u64> = newest_first(vec![msg(3), msg(9), msg(5)], 20)
            .iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![9, 5, 3]);
    }

    #[test]
    fn test_newest_first_drops_oldest_beyond_limit() {
        let batch = (1..=25).map(msg).collect();
        let window = newest_first(batch, 20);
        assert_eq!(window.len(), 20);
        assert_eq!(window.first().map(|m| m.id), Some(25));
        assert_eq!(window.last().map(|m| m.id), Some(6));
    }

    #[test]
    fn test_newest_first_removes_duplicates() {
        let window = newest_first(vec![msg(4), msg(4), msg(2)], 20);
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn test_preview_takes_first_line_and_truncates() {
        let m = msg(1).with_preview("hello\nworld");
        assert_eq!(m.preview.as_deref(), Some("hello"));

        let long = "x".repeat(60);
        let m = msg(1).with_preview(&long);
        let preview = m.preview.unwrap();
        assert_eq!(preview.chars().count(), 41);
        assert!(preview.ends_with('…'));
    }

    #[test]
    fn test_recipient_from_numeric_id() {
        let r = RecipientId::from(6339008344_i64);
        assert_eq!(r.as_str(), "6339008344");
        assert_eq!(r.to_string(), "6339008344");
    }
}
