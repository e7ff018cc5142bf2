//! Frame types for the Easel protocol.
//!
//! Frames are the messages exchanged between clients and the room server.
//! Each frame is serialized using MessagePack for efficient binary encoding.

use serde::{Deserialize, Serialize};

/// Position of a sample within a pen gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrokeKind {
    /// First sample of a gesture.
    Begin,
    /// Mid-gesture sample.
    Point,
    /// Final sample of a gesture.
    End,
}

/// One point sample of a pen gesture, as stored in a room's event log.
///
/// `author` is always the server-assigned connection id; any identity a
/// client supplies inbound is discarded before an event reaches the log.
/// `color` and `width` are carried through opaquely, never interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrokeEvent {
    /// Server-assigned author identity.
    pub author: String,
    /// Sample position within the gesture.
    pub kind: StrokeKind,
    /// Canvas x coordinate (client-local space).
    pub x: f64,
    /// Canvas y coordinate (client-local space).
    pub y: f64,
    /// Stroke color, opaque to the engine.
    pub color: String,
    /// Stroke width, opaque to the engine.
    pub width: f64,
}

impl StrokeEvent {
    /// Create a new stroke event.
    #[must_use]
    pub fn new(
        author: impl Into<String>,
        kind: StrokeKind,
        x: f64,
        y: f64,
        color: impl Into<String>,
        width: f64,
    ) -> Self {
        Self {
            author: author.into(),
            kind,
            x,
            y,
            color: color.into(),
            width,
        }
    }

    /// Check whether this event opens a stroke.
    #[must_use]
    pub fn is_begin(&self) -> bool {
        self.kind == StrokeKind::Begin
    }

    /// Check whether this event closes a stroke.
    #[must_use]
    pub fn is_end(&self) -> bool {
        self.kind == StrokeKind::End
    }
}

/// A frame sent by a client to the server.
///
/// The room a frame applies to is established at connection time, not per
/// frame. Client-supplied `author` fields exist for wire compatibility only
/// and are ignored by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    /// A draw sample.
    #[serde(rename = "draw")]
    Draw {
        /// Sample position within the gesture.
        kind: StrokeKind,
        /// Canvas x coordinate.
        x: f64,
        /// Canvas y coordinate.
        y: f64,
        /// Stroke color.
        color: String,
        /// Stroke width.
        width: f64,
        /// Claimed identity. Ignored; the server tags the sample itself.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        author: Option<String>,
    },

    /// A cursor position update.
    #[serde(rename = "cursor")]
    Cursor {
        /// Canvas x coordinate.
        x: f64,
        /// Canvas y coordinate.
        y: f64,
        /// Claimed identity. Ignored; the server tags the update itself.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        author: Option<String>,
    },

    /// A chat message.
    #[serde(rename = "chat")]
    Chat {
        /// Message text, opaque to the engine.
        text: String,
    },

    /// Remove the sender's most recent stroke.
    #[serde(rename = "undo")]
    Undo,

    /// Wipe the room's entire history.
    #[serde(rename = "clear")]
    Clear,

    /// Keepalive ping.
    #[serde(rename = "ping")]
    Ping {
        /// Optional timestamp, echoed back in the pong.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },
}

impl ClientFrame {
    /// Short name of the frame variant, for logging.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ClientFrame::Draw { .. } => "draw",
            ClientFrame::Cursor { .. } => "cursor",
            ClientFrame::Chat { .. } => "chat",
            ClientFrame::Undo => "undo",
            ClientFrame::Clear => "clear",
            ClientFrame::Ping { .. } => "ping",
        }
    }
}

/// A frame sent by the server to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    /// Join acknowledgement, sent once to the joining member.
    #[serde(rename = "joined")]
    Joined {
        /// The identity the server assigned to this connection.
        author_id: String,
        /// The room that was joined.
        room: String,
        /// Human-readable welcome text.
        welcome: String,
    },

    /// Full ordered history of the room's event log.
    ///
    /// Sent once on join, and again after every undo that changed the log
    /// and every clear. Clients apply it as "wipe and replay from empty".
    #[serde(rename = "history")]
    History {
        /// The room's events, oldest first.
        events: Vec<StrokeEvent>,
    },

    /// A live draw sample from another member.
    #[serde(rename = "draw")]
    Draw {
        /// The author-tagged sample.
        event: StrokeEvent,
    },

    /// A live cursor position from another member.
    #[serde(rename = "cursor")]
    Cursor {
        /// Server-assigned identity of the member that moved.
        author: String,
        /// Canvas x coordinate.
        x: f64,
        /// Canvas y coordinate.
        y: f64,
    },

    /// A chat message, fanned out to every member including the sender.
    #[serde(rename = "chat")]
    Chat {
        /// Server-assigned identity of the sender.
        author: String,
        /// Sender's display name.
        name: String,
        /// Message text.
        text: String,
        /// Server-assigned Unix timestamp in milliseconds.
        timestamp: u64,
    },

    /// Keepalive pong.
    #[serde(rename = "pong")]
    Pong {
        /// Echoed timestamp from the ping.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },
}

impl ServerFrame {
    /// Create a new Joined frame with the standard welcome text.
    #[must_use]
    pub fn joined(author_id: impl Into<String>, room: impl Into<String>) -> Self {
        let room = room.into();
        let welcome = format!("Welcome to room {room}");
        ServerFrame::Joined {
            author_id: author_id.into(),
            room,
            welcome,
        }
    }

    /// Create a new History frame.
    #[must_use]
    pub fn history(events: Vec<StrokeEvent>) -> Self {
        ServerFrame::History { events }
    }

    /// Create a new Draw frame.
    #[must_use]
    pub fn draw(event: StrokeEvent) -> Self {
        ServerFrame::Draw { event }
    }

    /// Create a new Cursor frame.
    #[must_use]
    pub fn cursor(author: impl Into<String>, x: f64, y: f64) -> Self {
        ServerFrame::Cursor {
            author: author.into(),
            x,
            y,
        }
    }

    /// Create a new Chat frame.
    #[must_use]
    pub fn chat(
        author: impl Into<String>,
        name: impl Into<String>,
        text: impl Into<String>,
        timestamp: u64,
    ) -> Self {
        ServerFrame::Chat {
            author: author.into(),
            name: name.into(),
            text: text.into(),
            timestamp,
        }
    }

    /// Create a new Pong frame.
    #[must_use]
    pub fn pong(timestamp: Option<u64>) -> Self {
        ServerFrame::Pong { timestamp }
    }
}
