//! Room abstraction.
//!
//! A room is a named collaboration session owning an event log (the stroke
//! history), a roster of connected members, and a broadcast sender used to
//! fan state out to them. Rooms are created lazily on first join and never
//! destroyed: the log outlives its members for the life of the process.

use crate::log::{EventLog, UndoOutcome, UndoStrategy};
use crate::message::RoomMessage;
use crate::roster::Roster;
use easel_protocol::StrokeEvent;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Maximum room id length.
pub const MAX_ROOM_ID_LENGTH: usize = 256;

/// Default broadcast channel capacity.
const DEFAULT_ROOM_CAPACITY: usize = 1024;

/// A room identifier.
pub type RoomId = String;

/// Validate a room id.
///
/// # Errors
///
/// Returns an error message if the room id is invalid.
pub fn validate_room_id(id: &str) -> Result<(), &'static str> {
    if id.is_empty() {
        return Err("Room id cannot be empty");
    }
    if id.len() > MAX_ROOM_ID_LENGTH {
        return Err("Room id too long");
    }
    if !id.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return Err("Room id contains invalid characters");
    }
    Ok(())
}

/// One isolated collaboration session.
#[derive(Debug)]
pub struct Room {
    /// Room id.
    name: RoomId,
    /// Ordered stroke history.
    log: EventLog,
    /// Currently connected members.
    roster: Roster,
    /// Broadcast sender for fan-out to member connection tasks.
    sender: broadcast::Sender<Arc<RoomMessage>>,
}

impl Room {
    /// Create a new empty room.
    #[must_use]
    pub fn new(name: impl Into<RoomId>) -> Self {
        Self::with_capacity(name, DEFAULT_ROOM_CAPACITY)
    }

    /// Create a new empty room with a specific broadcast capacity.
    #[must_use]
    pub fn with_capacity(name: impl Into<RoomId>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            name: name.into(),
            log: EventLog::new(),
            roster: Roster::new(),
            sender,
        }
    }

    /// Get the room id.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of connected members.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.roster.count()
    }

    /// Check if a connection is a member.
    #[must_use]
    pub fn is_member(&self, connection_id: &str) -> bool {
        self.roster.is_member(connection_id)
    }

    /// Check if the room has no members. The log is untouched by this.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roster.is_empty()
    }

    /// Number of events in the log.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.log.len()
    }

    /// Add a member and return its receiver for room broadcasts.
    ///
    /// Must be called under the same exclusion as [`snapshot`](Self::snapshot)
    /// so the history replay and the live stream partition the event
    /// sequence exactly.
    pub fn join(
        &mut self,
        connection_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> broadcast::Receiver<Arc<RoomMessage>> {
        let conn_id = connection_id.into();
        self.roster.join(conn_id.clone(), display_name);
        debug!(room = %self.name, connection = %conn_id, "Member joined");
        self.sender.subscribe()
    }

    /// Remove a member.
    ///
    /// Open strokes are not auto-closed and peers are not notified; the
    /// departing member simply stops receiving broadcasts when its
    /// receiver is dropped. Returns `true` if the connection was a member.
    pub fn leave(&mut self, connection_id: &str) -> bool {
        let removed = self.roster.leave(connection_id).is_some();
        if removed {
            debug!(room = %self.name, connection = %connection_id, "Member left");
        }
        removed
    }

    /// Append an author-tagged event to the log. Returns the new length.
    pub fn append(&mut self, event: StrokeEvent) -> usize {
        self.log.append(event)
    }

    /// Full ordered copy of the log.
    #[must_use]
    pub fn snapshot(&self) -> Vec<StrokeEvent> {
        self.log.snapshot()
    }

    /// Remove the author's most recent stroke from the log.
    pub fn undo(&mut self, author: &str, strategy: UndoStrategy) -> UndoOutcome {
        self.log.remove_last_stroke_by(author, strategy)
    }

    /// Wipe the log.
    pub fn clear_history(&mut self) {
        self.log.clear();
    }

    /// Overwrite a member's last-known cursor position.
    pub fn update_cursor(&mut self, connection_id: &str, x: f64, y: f64) -> bool {
        self.roster.update_cursor(connection_id, x, y)
    }

    /// Get a member's display name.
    #[must_use]
    pub fn display_name(&self, connection_id: &str) -> Option<&str> {
        self.roster.display_name(connection_id)
    }

    /// Publish a message to all member connection tasks.
    ///
    /// Audience filtering happens receiver-side; delivery to each member is
    /// independent, so a slow member never stalls the rest. Returns the
    /// number of receivers.
    pub fn publish(&self, message: RoomMessage) -> usize {
        trace!(room = %self.name, audience = ?message.audience, "Publishing message");
        self.sender.send(Arc::new(message)).unwrap_or_default()
    }
}
