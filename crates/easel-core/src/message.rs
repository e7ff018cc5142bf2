//! Internal fan-out message types.
//!
//! A [`RoomMessage`] is a pre-encoded outbound frame with routing metadata:
//! the frame is encoded once at publish time and the bytes are shared
//! across every recipient.

use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A unique message identifier.
pub type MessageId = u64;

/// Atomic counter for ensuring unique IDs even within the same nanosecond.
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a unique message ID.
#[must_use]
pub fn generate_message_id() -> MessageId {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    timestamp.wrapping_add(counter)
}

/// Unix timestamp in milliseconds, for chat frames.
#[must_use]
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Who a room broadcast is delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Every current member, the sender included (chat, history resync).
    All,
    /// Every current member except the sender (live draw and cursor echo).
    AllButSource,
}

/// A message fanned out to a room's members.
#[derive(Debug, Clone)]
pub struct RoomMessage {
    /// Unique message identifier.
    pub id: MessageId,
    /// Connection id of the member whose action produced this message.
    pub source: String,
    /// The room this message belongs to.
    pub room: String,
    /// Delivery policy.
    pub audience: Audience,
    /// Encoded outbound frame (shared for zero-copy broadcast).
    pub payload: Arc<Bytes>,
    /// Timestamp when the message was created.
    pub timestamp: u64,
}

impl RoomMessage {
    /// Create a new room message.
    #[must_use]
    pub fn new(
        room: impl Into<String>,
        source: impl Into<String>,
        audience: Audience,
        payload: Bytes,
    ) -> Self {
        Self {
            id: generate_message_id(),
            source: source.into(),
            room: room.into(),
            audience,
            payload: Arc::new(payload),
            timestamp: unix_millis(),
        }
    }

    /// Whether the given connection should receive this message.
    #[must_use]
    pub fn is_for(&self, connection_id: &str) -> bool {
        match self.audience {
            Audience::All => true,
            Audience::AllButSource => self.source != connection_id,
        }
    }

    /// Get the payload size in bytes.
    #[must_use]
    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audience_filter() {
        let echo = RoomMessage::new("r1", "conn-1", Audience::AllButSource, Bytes::new());
        assert!(!echo.is_for("conn-1"));
        assert!(echo.is_for("conn-2"));

        let chat = RoomMessage::new("r1", "conn-1", Audience::All, Bytes::new());
        assert!(chat.is_for("conn-1"));
        assert!(chat.is_for("conn-2"));
    }

    #[test]
    fn test_unique_message_ids() {
        let id1 = generate_message_id();
        let id2 = generate_message_id();
        assert_ne!(id1, id2);
    }
}
