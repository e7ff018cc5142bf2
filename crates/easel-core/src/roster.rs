//! Member roster for a room.
//!
//! Tracks who is currently connected to a room: the server-assigned
//! connection identity, a display name, and the transient last-known
//! cursor position. Cursor state is never part of the event log and is
//! never replayed to newcomers.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// A transient cursor position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CursorPosition {
    /// Canvas x coordinate.
    pub x: f64,
    /// Canvas y coordinate.
    pub y: f64,
}

/// State for a single room member.
#[derive(Debug, Clone)]
pub struct Member {
    /// Server-assigned connection identity, stable for the connection's
    /// lifetime. Doubles as the author id on stroke events.
    pub connection_id: String,
    /// Display name supplied at connect time.
    pub display_name: String,
    /// Last-known cursor position, overwritten on every update.
    pub cursor: Option<CursorPosition>,
    /// When the member joined, Unix millis.
    pub joined_at: u64,
}

impl Member {
    /// Create a new member record.
    #[must_use]
    pub fn new(connection_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        Self {
            connection_id: connection_id.into(),
            display_name: display_name.into(),
            cursor: None,
            joined_at: now,
        }
    }
}

/// Roster of a room's currently connected members.
#[derive(Debug, Default)]
pub struct Roster {
    members: HashMap<String, Member>,
}

impl Roster {
    /// Create an empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of connected members.
    #[must_use]
    pub fn count(&self) -> usize {
        self.members.len()
    }

    /// Check if a connection is a member.
    #[must_use]
    pub fn is_member(&self, connection_id: &str) -> bool {
        self.members.contains_key(connection_id)
    }

    /// Get a member's record.
    #[must_use]
    pub fn get(&self, connection_id: &str) -> Option<&Member> {
        self.members.get(connection_id)
    }

    /// Get a member's display name.
    #[must_use]
    pub fn display_name(&self, connection_id: &str) -> Option<&str> {
        self.members
            .get(connection_id)
            .map(|m| m.display_name.as_str())
    }

    /// Add a member to the roster.
    ///
    /// Returns `true` if this is a new member.
    pub fn join(
        &mut self,
        connection_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> bool {
        let conn_id = connection_id.into();
        let is_new = !self.members.contains_key(&conn_id);

        self.members
            .insert(conn_id.clone(), Member::new(conn_id.clone(), display_name));

        if is_new {
            debug!(connection = %conn_id, "Roster: member joined");
        }

        is_new
    }

    /// Remove a member from the roster.
    ///
    /// Returns the removed record, if any. Nothing else is touched: open
    /// strokes in the log stay open and no peer is notified.
    pub fn leave(&mut self, connection_id: &str) -> Option<Member> {
        let member = self.members.remove(connection_id);
        if member.is_some() {
            debug!(connection = %connection_id, "Roster: member left");
        }
        member
    }

    /// Overwrite a member's last-known cursor position.
    ///
    /// Returns `true` if the member exists.
    pub fn update_cursor(&mut self, connection_id: &str, x: f64, y: f64) -> bool {
        if let Some(member) = self.members.get_mut(connection_id) {
            member.cursor = Some(CursorPosition { x, y });
            true
        } else {
            false
        }
    }

    /// All connection ids on the roster.
    #[must_use]
    pub fn connection_ids(&self) -> Vec<&str> {
        self.members.keys().map(|s| s.as_str()).collect()
    }

    /// Check if the roster is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
