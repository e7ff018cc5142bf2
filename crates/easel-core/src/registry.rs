//! Room registry: the per-room coordination point.
//!
//! The registry owns every room in the process and translates member
//! actions into event-log operations plus the distribution policy each
//! action calls for: sender-excluded echo for live strokes and cursors,
//! full-room rebroadcast for chat and structural changes, and history
//! replay for newcomers.
//!
//! Each room's `DashMap` entry lock is that room's unit of mutual
//! exclusion: every action holds it for its whole read-mutate-snapshot-
//! publish sequence, so the log order always equals receipt order and a
//! snapshot can never tear. Different rooms proceed in parallel.

use crate::log::{UndoOutcome, UndoStrategy};
use crate::message::{unix_millis, Audience, RoomMessage};
use crate::room::{validate_room_id, Room, RoomId};
use dashmap::DashMap;
use easel_protocol::{codec, ProtocolError, ServerFrame, StrokeEvent, StrokeKind};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Invalid room id.
    #[error("Invalid room id: {0}")]
    InvalidRoom(&'static str),

    /// Room not found.
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// The connection is not a member of the room.
    #[error("Not a member of room: {0}")]
    NotAMember(String),

    /// Maximum room count reached.
    #[error("Maximum room count reached")]
    MaxRoomsReached,

    /// Outbound frame could not be encoded.
    #[error("Frame encoding failed: {0}")]
    Encode(#[from] ProtocolError),
}

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum number of rooms.
    pub max_rooms: usize,
    /// Broadcast capacity per room.
    pub room_capacity: usize,
    /// Undo range-removal policy.
    pub undo_strategy: UndoStrategy,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_rooms: 10_000,
            room_capacity: 1024,
            undo_strategy: UndoStrategy::default(),
        }
    }
}

/// What a newcomer gets back from [`RoomRegistry::join`].
pub struct JoinedRoom {
    /// Receiver for the room's broadcasts from this point on.
    pub receiver: broadcast::Receiver<Arc<RoomMessage>>,
    /// Full history at the moment of joining, to replay before any live
    /// event delivered through the receiver.
    pub history: Vec<StrokeEvent>,
}

/// The process-wide room table.
///
/// Rooms are created lazily on first join and never evicted: a room whose
/// last member leaves keeps its log in memory for the life of the process,
/// so returning members see the same canvas. Eviction-on-empty would be a
/// behavior change (history resets) and is deliberately not implemented.
pub struct RoomRegistry {
    /// Rooms indexed by id.
    rooms: DashMap<RoomId, Room>,
    /// Configuration.
    config: RegistryConfig,
}

impl RoomRegistry {
    /// Create a new registry with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new registry with custom configuration.
    #[must_use]
    pub fn with_config(config: RegistryConfig) -> Self {
        info!("Creating room registry with config: {:?}", config);
        Self {
            rooms: DashMap::new(),
            config,
        }
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            room_count: self.rooms.len(),
            member_count: 0,
            event_count: 0,
        };
        for room in self.rooms.iter() {
            stats.member_count += room.member_count();
            stats.event_count += room.event_count();
        }
        stats
    }

    /// Check if a room exists.
    #[must_use]
    pub fn room_exists(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Number of members currently in a room.
    #[must_use]
    pub fn member_count(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map_or(0, |r| r.member_count())
    }

    /// Number of events in a room's log.
    #[must_use]
    pub fn event_count(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map_or(0, |r| r.event_count())
    }

    /// Add a connection to a room, creating the room on first reference.
    ///
    /// The broadcast subscription and the history snapshot are taken under
    /// the same room lock, so the returned history plus the live stream
    /// from the receiver cover the room's events exactly once each. Peers
    /// are not notified of the join.
    ///
    /// # Errors
    ///
    /// Returns an error if the room id is invalid or the room limit would
    /// be exceeded.
    pub fn join(
        &self,
        connection_id: &str,
        room_id: &str,
        display_name: &str,
    ) -> Result<JoinedRoom, RegistryError> {
        validate_room_id(room_id).map_err(RegistryError::InvalidRoom)?;

        if !self.rooms.contains_key(room_id) && self.rooms.len() >= self.config.max_rooms {
            return Err(RegistryError::MaxRoomsReached);
        }

        let mut room = self.rooms.entry(room_id.to_string()).or_insert_with(|| {
            debug!(room = %room_id, "Creating new room");
            Room::with_capacity(room_id, self.config.room_capacity)
        });

        let receiver = room.join(connection_id, display_name);
        let history = room.snapshot();

        debug!(
            room = %room_id,
            connection = %connection_id,
            members = room.member_count(),
            history = history.len(),
            "Joined"
        );

        Ok(JoinedRoom { receiver, history })
    }

    /// Remove a connection from its room.
    ///
    /// The log is untouched: open strokes stay open, no implicit `End` or
    /// undo happens, and peers are not notified. The room itself survives
    /// with zero members.
    pub fn leave(&self, connection_id: &str, room_id: &str) {
        if let Some(mut room) = self.rooms.get_mut(room_id) {
            room.leave(connection_id);
            debug!(
                room = %room_id,
                connection = %connection_id,
                members = room.member_count(),
                "Left"
            );
        }
    }

    /// Apply a draw sample: append to the log, echo to everyone but the
    /// sender. The author tag is always the server-assigned connection id;
    /// whatever identity the client claimed inbound never reaches here.
    ///
    /// Returns the number of member connection tasks the echo reached.
    ///
    /// # Errors
    ///
    /// Returns an error if the room is unknown, the connection is not a
    /// member, or the outbound frame cannot be encoded.
    pub fn draw(
        &self,
        connection_id: &str,
        room_id: &str,
        kind: StrokeKind,
        x: f64,
        y: f64,
        color: String,
        width: f64,
    ) -> Result<usize, RegistryError> {
        let mut room = self.room_mut(room_id)?;
        if !room.is_member(connection_id) {
            return Err(RegistryError::NotAMember(room_id.to_string()));
        }

        let event = StrokeEvent::new(connection_id, kind, x, y, color, width);
        let payload = codec::encode(&ServerFrame::draw(event.clone()))?;
        let length = room.append(event);
        trace!(room = %room_id, connection = %connection_id, length, "Appended draw sample");

        Ok(room.publish(RoomMessage::new(
            room_id,
            connection_id,
            Audience::AllButSource,
            payload,
        )))
    }

    /// Forward a cursor position to everyone but the sender, tagged with
    /// the server-assigned identity. No log effect; the roster keeps only
    /// the overwritable latest position.
    ///
    /// # Errors
    ///
    /// Returns an error if the room is unknown, the connection is not a
    /// member, or the outbound frame cannot be encoded.
    pub fn cursor(
        &self,
        connection_id: &str,
        room_id: &str,
        x: f64,
        y: f64,
    ) -> Result<usize, RegistryError> {
        let mut room = self.room_mut(room_id)?;
        if !room.update_cursor(connection_id, x, y) {
            return Err(RegistryError::NotAMember(room_id.to_string()));
        }

        let payload = codec::encode(&ServerFrame::cursor(connection_id, x, y))?;
        Ok(room.publish(RoomMessage::new(
            room_id,
            connection_id,
            Audience::AllButSource,
            payload,
        )))
    }

    /// Fan a chat message out to every member, the sender included.
    /// Empty text is valid and forwarded as-is. No log effect.
    ///
    /// # Errors
    ///
    /// Returns an error if the room is unknown, the connection is not a
    /// member, or the outbound frame cannot be encoded.
    pub fn chat(
        &self,
        connection_id: &str,
        room_id: &str,
        text: String,
    ) -> Result<usize, RegistryError> {
        let room = self.room_mut(room_id)?;
        let Some(name) = room.display_name(connection_id) else {
            return Err(RegistryError::NotAMember(room_id.to_string()));
        };

        let frame = ServerFrame::chat(connection_id, name, text, unix_millis());
        let payload = codec::encode(&frame)?;
        Ok(room.publish(RoomMessage::new(
            room_id,
            connection_id,
            Audience::All,
            payload,
        )))
    }

    /// Undo the sender's most recent stroke.
    ///
    /// When the log changed, every member (the requester included) gets a
    /// full history snapshot of the now-shorter log; when nothing matched,
    /// nothing is sent at all.
    ///
    /// # Errors
    ///
    /// Returns an error if the room is unknown, the connection is not a
    /// member, or the outbound frame cannot be encoded.
    pub fn undo(&self, connection_id: &str, room_id: &str) -> Result<UndoOutcome, RegistryError> {
        let mut room = self.room_mut(room_id)?;
        if !room.is_member(connection_id) {
            return Err(RegistryError::NotAMember(room_id.to_string()));
        }

        let outcome = room.undo(connection_id, self.config.undo_strategy);
        if outcome.changed() {
            debug!(room = %room_id, connection = %connection_id, ?outcome, "Undo applied");
            let payload = codec::encode(&ServerFrame::history(room.snapshot()))?;
            room.publish(RoomMessage::new(
                room_id,
                connection_id,
                Audience::All,
                payload,
            ));
        }

        Ok(outcome)
    }

    /// Wipe the room's history.
    ///
    /// Always rebroadcasts the (now empty) snapshot to every member, even
    /// when the log was already empty: structural ops resync
    /// unconditionally.
    ///
    /// # Errors
    ///
    /// Returns an error if the room is unknown, the connection is not a
    /// member, or the outbound frame cannot be encoded.
    pub fn clear(&self, connection_id: &str, room_id: &str) -> Result<usize, RegistryError> {
        let mut room = self.room_mut(room_id)?;
        if !room.is_member(connection_id) {
            return Err(RegistryError::NotAMember(room_id.to_string()));
        }

        room.clear_history();
        debug!(room = %room_id, connection = %connection_id, "History cleared");

        let payload = codec::encode(&ServerFrame::history(room.snapshot()))?;
        Ok(room.publish(RoomMessage::new(
            room_id,
            connection_id,
            Audience::All,
            payload,
        )))
    }

    fn room_mut(
        &self,
        room_id: &str,
    ) -> Result<dashmap::mapref::one::RefMut<'_, RoomId, Room>, RegistryError> {
        self.rooms
            .get_mut(room_id)
            .ok_or_else(|| RegistryError::RoomNotFound(room_id.to_string()))
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry statistics.
#[derive(Debug, Clone)]
pub struct RegistryStats {
    /// Number of rooms (including empty ones).
    pub room_count: usize,
    /// Number of connected members across all rooms.
    pub member_count: usize,
    /// Number of logged events across all rooms.
    pub event_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use easel_protocol::codec::decode;
    use tokio::sync::broadcast::error::TryRecvError;

    fn decode_payload(msg: &RoomMessage) -> ServerFrame {
        decode(&msg.payload).expect("broadcast payload must decode")
    }

    fn draw_stroke(registry: &RoomRegistry, conn: &str, room: &str, base: f64) {
        registry
            .draw(conn, room, StrokeKind::Begin, base, base, "#000".into(), 2.0)
            .unwrap();
        registry
            .draw(conn, room, StrokeKind::Point, base + 1.0, base + 1.0, "#000".into(), 2.0)
            .unwrap();
        registry
            .draw(conn, room, StrokeKind::End, base + 2.0, base + 2.0, "#000".into(), 2.0)
            .unwrap();
    }

    #[tokio::test]
    async fn test_join_replays_history_before_live_events() {
        let registry = RoomRegistry::new();

        let _first = registry.join("conn-1", "r1", "alice").unwrap();
        draw_stroke(&registry, "conn-1", "r1", 0.0);

        // Newcomer sees exactly the three prior events in its snapshot and
        // nothing older on the live receiver.
        let mut joined = registry.join("conn-2", "r1", "bob").unwrap();
        assert_eq!(joined.history.len(), 3);
        assert!(joined.history[0].is_begin());
        assert_eq!(joined.history[0].author, "conn-1");
        assert!(matches!(
            joined.receiver.try_recv(),
            Err(TryRecvError::Empty)
        ));

        // A live event lands on the receiver after the replayed history.
        registry
            .draw("conn-1", "r1", StrokeKind::Begin, 9.0, 9.0, "#fff".into(), 1.0)
            .unwrap();
        let msg = joined.receiver.try_recv().unwrap();
        assert!(msg.is_for("conn-2"));
    }

    #[tokio::test]
    async fn test_draw_is_tagged_with_connection_identity() {
        let registry = RoomRegistry::new();
        let _a = registry.join("conn-1", "r1", "alice").unwrap();
        let mut b = registry.join("conn-2", "r1", "bob").unwrap();

        registry
            .draw("conn-1", "r1", StrokeKind::Begin, 1.0, 2.0, "#abc".into(), 4.0)
            .unwrap();

        let msg = b.receiver.try_recv().unwrap();
        assert_eq!(msg.audience, Audience::AllButSource);
        assert!(!msg.is_for("conn-1"));

        match decode_payload(&msg) {
            ServerFrame::Draw { event } => {
                assert_eq!(event.author, "conn-1");
                assert_eq!((event.x, event.y), (1.0, 2.0));
            }
            other => panic!("Expected draw frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cursor_excludes_sender_and_uses_server_identity() {
        let registry = RoomRegistry::new();
        let _a = registry.join("conn-1", "r1", "alice").unwrap();
        let mut b = registry.join("conn-2", "r1", "bob").unwrap();

        registry.cursor("conn-1", "r1", 7.0, 8.0).unwrap();

        let msg = b.receiver.try_recv().unwrap();
        assert!(!msg.is_for("conn-1"));
        match decode_payload(&msg) {
            ServerFrame::Cursor { author, x, y } => {
                assert_eq!(author, "conn-1");
                assert_eq!((x, y), (7.0, 8.0));
            }
            other => panic!("Expected cursor frame, got {other:?}"),
        }

        // Cursor updates never touch the log.
        assert_eq!(registry.event_count("r1"), 0);
    }

    #[tokio::test]
    async fn test_chat_includes_sender() {
        let registry = RoomRegistry::new();
        let mut a = registry.join("conn-1", "r1", "alice").unwrap();

        registry.chat("conn-1", "r1", "hello".into()).unwrap();

        let msg = a.receiver.try_recv().unwrap();
        assert!(msg.is_for("conn-1"));
        match decode_payload(&msg) {
            ServerFrame::Chat {
                author,
                name,
                text,
                timestamp,
            } => {
                assert_eq!(author, "conn-1");
                assert_eq!(name, "alice");
                assert_eq!(text, "hello");
                assert!(timestamp > 0);
            }
            other => panic!("Expected chat frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_undo_removes_own_stroke_only() {
        // A draws Begin/Point/End, B draws Begin/End, then A undoes.
        // Only B's stroke survives.
        let registry = RoomRegistry::new();
        let mut a = registry.join("A", "r1", "alice").unwrap();
        let _b = registry.join("B", "r1", "bob").unwrap();

        draw_stroke(&registry, "A", "r1", 0.0);
        registry
            .draw("B", "r1", StrokeKind::Begin, 5.0, 5.0, "#000".into(), 2.0)
            .unwrap();
        registry
            .draw("B", "r1", StrokeKind::End, 6.0, 6.0, "#000".into(), 2.0)
            .unwrap();

        // Drain the live echoes of B's two samples.
        while a.receiver.try_recv().is_ok() {}

        let outcome = registry.undo("A", "r1").unwrap();
        assert_eq!(outcome, UndoOutcome::Removed(3));

        let msg = a.receiver.try_recv().unwrap();
        assert!(msg.is_for("A"), "undo resync goes to the requester too");
        match decode_payload(&msg) {
            ServerFrame::History { events } => {
                assert_eq!(events.len(), 2);
                assert!(events.iter().all(|e| e.author == "B"));
                assert_eq!((events[0].x, events[1].x), (5.0, 6.0));
            }
            other => panic!("Expected history frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_undo_noop_broadcasts_nothing() {
        let registry = RoomRegistry::new();
        let mut a = registry.join("A", "r1", "alice").unwrap();

        let outcome = registry.undo("A", "r1").unwrap();
        assert_eq!(outcome, UndoOutcome::NothingToUndo);
        assert!(matches!(a.receiver.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_clear_on_empty_log_still_broadcasts() {
        let registry = RoomRegistry::new();
        let mut a = registry.join("A", "r1", "alice").unwrap();

        registry.clear("A", "r1").unwrap();

        let msg = a.receiver.try_recv().unwrap();
        match decode_payload(&msg) {
            ServerFrame::History { events } => assert!(events.is_empty()),
            other => panic!("Expected history frame, got {other:?}"),
        }

        // And again: clear is idempotent but the resync still goes out.
        registry.clear("A", "r1").unwrap();
        assert!(a.receiver.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_disconnect_leaves_open_stroke_in_log() {
        let registry = RoomRegistry::new();
        let _a = registry.join("A", "r1", "alice").unwrap();

        registry
            .draw("A", "r1", StrokeKind::Begin, 0.0, 0.0, "#000".into(), 2.0)
            .unwrap();
        registry.leave("A", "r1");

        // No implicit End, no undo: the stale open stroke persists and a
        // later joiner replays it as-is.
        let joined = registry.join("B", "r1", "bob").unwrap();
        assert_eq!(joined.history.len(), 1);
        assert!(joined.history[0].is_begin());
        assert_eq!(joined.history[0].author, "A");
    }

    #[tokio::test]
    async fn test_rooms_are_never_evicted() {
        let registry = RoomRegistry::new();
        let _a = registry.join("A", "r1", "alice").unwrap();
        draw_stroke(&registry, "A", "r1", 0.0);
        registry.leave("A", "r1");

        assert!(registry.room_exists("r1"));
        assert_eq!(registry.member_count("r1"), 0);
        assert_eq!(registry.event_count("r1"), 3);
    }

    #[tokio::test]
    async fn test_cross_room_isolation() {
        let registry = RoomRegistry::new();
        let mut a = registry.join("A", "r1", "alice").unwrap();
        let _b = registry.join("B", "r2", "bob").unwrap();

        registry
            .draw("B", "r2", StrokeKind::Begin, 0.0, 0.0, "#000".into(), 2.0)
            .unwrap();
        registry.chat("B", "r2", "hi".into()).unwrap();

        assert!(matches!(a.receiver.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(registry.event_count("r1"), 0);
    }

    #[test]
    fn test_join_rejects_invalid_room_id() {
        let registry = RoomRegistry::new();
        assert!(matches!(
            registry.join("conn-1", "", "alice"),
            Err(RegistryError::InvalidRoom(_))
        ));
        assert_eq!(registry.stats().room_count, 0);
    }

    #[test]
    fn test_room_limit() {
        let registry = RoomRegistry::with_config(RegistryConfig {
            max_rooms: 1,
            ..RegistryConfig::default()
        });

        let _a = registry.join("A", "r1", "alice").unwrap();
        assert!(matches!(
            registry.join("B", "r2", "bob"),
            Err(RegistryError::MaxRoomsReached)
        ));
        // Joining an existing room is still fine at the limit.
        assert!(registry.join("B", "r1", "bob").is_ok());
    }

    #[test]
    fn test_actions_require_membership() {
        let registry = RoomRegistry::new();
        let _a = registry.join("A", "r1", "alice").unwrap();

        assert!(matches!(
            registry.chat("ghost", "r1", "boo".into()),
            Err(RegistryError::NotAMember(_))
        ));
        assert!(matches!(
            registry.undo("ghost", "r1"),
            Err(RegistryError::NotAMember(_))
        ));
        assert!(matches!(
            registry.draw("A", "nope", StrokeKind::Begin, 0.0, 0.0, "#0".into(), 1.0),
            Err(RegistryError::RoomNotFound(_))
        ));
    }

    #[test]
    fn test_registry_stats() {
        let registry = RoomRegistry::new();
        let _a = registry.join("A", "r1", "alice").unwrap();
        let _b = registry.join("B", "r1", "bob").unwrap();
        let _c = registry.join("C", "r2", "carol").unwrap();
        draw_stroke(&registry, "A", "r1", 0.0);

        let stats = registry.stats();
        assert_eq!(stats.room_count, 2);
        assert_eq!(stats.member_count, 3);
        assert_eq!(stats.event_count, 3);
    }
}
