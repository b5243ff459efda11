//! # superchat-proto
//!
//! Wire protocol for the SuperChat chat/forum server.
//!
//! The protocol is a length-prefixed binary framing layer carrying typed
//! payloads:
//!
//! ```text
//! length(u32 BE) | version(u8) | type(u8) | flags(u8) | payload
//! ```
//!
//! `length` counts everything after itself (version + type + flags +
//! payload). Payloads larger than [`frame::COMPRESS_THRESHOLD`] may be
//! LZ4-block compressed (flags bit 0); DM payloads may be end-to-end
//! encrypted (flags bit 1), in which case the `content` bytes are opaque
//! ciphertext the server relays verbatim.
//!
//! ## Quick start
//!
//! ```rust
//! use superchat_proto::messages::{Message, SetNickname};
//!
//! let msg = Message::SetNickname(SetNickname { nickname: "alice".into() });
//! let frame = msg.to_frame();
//! let decoded = frame.message().expect("valid payload");
//! assert_eq!(decoded, msg);
//! ```
//!
//! All multi-byte integers are big-endian. Strings are `u16 BE` length
//! prefixed UTF-8. Optional fields are a presence byte followed by the
//! value. Timestamps are server-assigned `i64` UNIX milliseconds.

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod auth;
pub mod dm;
pub mod error;
pub mod frame;
pub mod messages;
pub mod types;
pub mod wire;

pub use error::{ErrorCode, WireError};
pub use frame::{Frame, FrameError, MAX_FRAME_SIZE, PROTOCOL_VERSION};
#[cfg(feature = "tokio")]
pub use frame::FrameCodec;
pub use messages::Message;
pub use types::MessageType;
