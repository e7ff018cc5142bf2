//! # easel-core
//!
//! Room session engine for the Easel collaborative drawing server.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **EventLog** - Per-room ordered stroke history with undo and clear
//! - **Room** - One collaboration session: log, roster, broadcast fan-out
//! - **RoomRegistry** - Process-wide room table and distribution policy
//! - **Roster** - Member identity, display names, transient cursors
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌─────────────┐
//! │  Connection │────▶│ RoomRegistry │────▶│    Room     │
//! └─────────────┘     └──────────────┘     └─────┬───────┘
//!                                                │
//!                                    ┌───────────┴───────────┐
//!                                    ▼                       ▼
//!                             ┌─────────────┐         ┌─────────────┐
//!                             │  EventLog   │         │   Roster    │
//!                             └─────────────┘         └─────────────┘
//! ```

pub mod log;
pub mod message;
pub mod registry;
pub mod room;
pub mod roster;

pub use log::{EventLog, UndoOutcome, UndoStrategy};
pub use message::{Audience, RoomMessage};
pub use registry::{JoinedRoom, RegistryConfig, RegistryError, RegistryStats, RoomRegistry};
pub use room::{validate_room_id, Room, RoomId};
pub use roster::{CursorPosition, Member, Roster};
