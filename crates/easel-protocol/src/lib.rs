//! # easel-protocol
//!
//! Wire protocol definitions for the Easel collaborative drawing server.
//!
//! This crate defines the binary protocol spoken between Easel clients and
//! the room server: the stroke event type, the client/server frame enums,
//! and a length-prefixed MessagePack codec.
//!
//! ## Frame surface
//!
//! Inbound ([`ClientFrame`]): `draw`, `cursor`, `chat`, `undo`, `clear`,
//! `ping`. Outbound ([`ServerFrame`]): `joined`, `history`, `draw`,
//! `cursor`, `chat`, `pong`.
//!
//! ## Example
//!
//! ```rust
//! use easel_protocol::{codec, ClientFrame};
//!
//! let frame = ClientFrame::Chat { text: "hello".into() };
//!
//! let encoded = codec::encode(&frame).unwrap();
//! let decoded: ClientFrame = codec::decode(&encoded).unwrap();
//! assert_eq!(frame, decoded);
//! ```

pub mod codec;
pub mod frames;

pub use codec::{decode, encode, ProtocolError};
pub use frames::{ClientFrame, ServerFrame, StrokeEvent, StrokeKind};
