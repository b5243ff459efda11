//! The length-prefixed binary frame and its tokio codec.
//!
//! ```text
//! length(u32 BE) | version(u8) | type(u8) | flags(u8) | payload
//! ```
//!
//! `length` counts version + type + flags + payload, so a frame with an
//! empty payload has `length == 3`. Frames whose declared length exceeds
//! [`MAX_FRAME_SIZE`] are rejected on the length word alone, before any
//! payload is buffered.
//!
//! Flags bit 0 marks an LZ4-block compressed payload, prefixed on the wire
//! by `uncompressed_size(u32 BE)`. Flags bit 1 marks an encrypted payload
//! whose `content` bytes are opaque ciphertext; encrypted frames are never
//! compressed, and the codec passes them through untouched.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::error::WireError;
use crate::messages::Message;
use crate::types::MessageType;

/// Hard cap on `length` (and therefore on any payload), in bytes.
pub const MAX_FRAME_SIZE: usize = 1_048_576;

/// Protocol version this crate speaks.
pub const PROTOCOL_VERSION: u8 = 1;

/// Lowest peer version that understands compressed payloads.
pub const COMPRESSION_MIN_VERSION: u8 = 1;

/// Outbound payloads larger than this are compressed for capable peers.
pub const COMPRESS_THRESHOLD: usize = 512;

/// Flags bit 0: payload is LZ4-block compressed.
pub const FLAG_COMPRESSED: u8 = 0b0000_0001;

/// Flags bit 1: payload content is end-to-end encrypted (opaque to servers).
pub const FLAG_ENCRYPTED: u8 = 0b0000_0010;

/// Frame header bytes counted by `length` (version + type + flags).
const HEADER_LEN: usize = 3;

/// A decoded frame. `payload` is decompressed unless the frame is encrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Protocol version the peer spoke.
    pub version: u8,
    /// Raw message type byte (see [`MessageType`]).
    pub msg_type: u8,
    /// Flag bits as received; [`FLAG_COMPRESSED`] is cleared after inflate.
    pub flags: u8,
    /// Payload bytes.
    pub payload: Bytes,
}

impl Frame {
    /// Frame a message with no flags at the current protocol version.
    pub fn new(msg_type: MessageType, payload: Bytes) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            msg_type: msg_type.code(),
            flags: 0,
            payload,
        }
    }

    /// Whether the encrypted flag is set.
    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    /// Decode the payload into a typed [`Message`].
    pub fn message(&self) -> Result<Message, WireError> {
        let msg_type = MessageType::try_from(self.msg_type)?;
        let mut payload = self.payload.clone();
        Message::decode(msg_type, &mut payload)
    }
}

/// Errors surfaced by the frame codec.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Declared length exceeded [`MAX_FRAME_SIZE`]. Connection must close.
    #[error("frame length {length} exceeds maximum {max}")]
    TooLarge {
        /// The declared length.
        length: usize,
        /// The cap it exceeded.
        max: usize,
    },

    /// Structurally invalid frame. Connection must close.
    #[error("malformed frame: {0}")]
    Malformed(&'static str),

    /// Compressed payload failed to inflate or overran its declared size.
    #[error("bad compressed payload: {0}")]
    Compression(String),

    /// Underlying transport error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Inflate an LZ4-block payload carrying its `uncompressed_size` prefix.
pub fn decompress_payload(raw: &[u8]) -> Result<Bytes, FrameError> {
    if raw.len() < 4 {
        return Err(FrameError::Malformed("compressed payload shorter than its size prefix"));
    }
    let uncompressed_size = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
    if uncompressed_size > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge {
            length: uncompressed_size,
            max: MAX_FRAME_SIZE,
        });
    }
    let out = lz4_flex::block::decompress(&raw[4..], uncompressed_size)
        .map_err(|e| FrameError::Compression(e.to_string()))?;
    Ok(Bytes::from(out))
}

/// Compress a payload, producing the `uncompressed_size`-prefixed form.
pub fn compress_payload(raw: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(raw.len() / 2 + 8);
    out.put_u32(raw.len() as u32);
    out.put_slice(&lz4_flex::block::compress(raw));
    out.freeze()
}

/// Stateful frame codec for one connection.
///
/// The decoder inflates compressed payloads; the encoder compresses
/// outbound payloads above [`COMPRESS_THRESHOLD`] once the peer has
/// advertised a capable version.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    peer_version: u8,
}

impl FrameCodec {
    /// Codec that will not compress until the peer's version is known.
    pub fn new() -> Self {
        Self { peer_version: 0 }
    }

    /// Record the version advertised by the peer's frames.
    pub fn set_peer_version(&mut self, version: u8) {
        self.peer_version = version;
    }

    /// Whether outbound compression is enabled for this peer.
    pub fn peer_supports_compression(&self) -> bool {
        self.peer_version >= COMPRESSION_MIN_VERSION
    }

    /// Encode a frame into `dst`, applying the outbound compression policy.
    pub fn encode_into(&self, frame: &Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        let mut flags = frame.flags & !FLAG_COMPRESSED;
        let payload: Bytes = if flags & FLAG_ENCRYPTED == 0
            && frame.payload.len() > COMPRESS_THRESHOLD
            && self.peer_supports_compression()
        {
            flags |= FLAG_COMPRESSED;
            compress_payload(&frame.payload)
        } else {
            frame.payload.clone()
        };

        let length = HEADER_LEN + payload.len();
        if length > MAX_FRAME_SIZE {
            return Err(FrameError::TooLarge {
                length,
                max: MAX_FRAME_SIZE,
            });
        }

        dst.reserve(4 + length);
        dst.put_u32(length as u32);
        dst.put_u8(frame.version);
        dst.put_u8(frame.msg_type);
        dst.put_u8(flags);
        dst.put_slice(&payload);
        Ok(())
    }

    /// Decode one frame from `src` if a complete frame is buffered.
    pub fn decode_from(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        if src.len() < 4 {
            return Ok(None);
        }

        let length = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if length > MAX_FRAME_SIZE {
            return Err(FrameError::TooLarge {
                length,
                max: MAX_FRAME_SIZE,
            });
        }
        if length < HEADER_LEN {
            return Err(FrameError::Malformed("frame length below header size"));
        }
        if src.len() < 4 + length {
            src.reserve(4 + length - src.len());
            return Ok(None);
        }

        src.advance(4);
        let version = src.get_u8();
        let msg_type = src.get_u8();
        let mut flags = src.get_u8();
        let raw = src.split_to(length - HEADER_LEN).freeze();

        self.peer_version = self.peer_version.max(version);

        let payload = if flags & FLAG_COMPRESSED != 0 {
            if flags & FLAG_ENCRYPTED != 0 {
                // Encrypted payloads are opaque; a peer must not compress them.
                return Err(FrameError::Malformed("encrypted frame marked compressed"));
            }
            flags &= !FLAG_COMPRESSED;
            decompress_payload(&raw)?
        } else {
            raw
        };

        Ok(Some(Frame {
            version,
            msg_type,
            flags,
            payload,
        }))
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "tokio")]
impl tokio_util::codec::Decoder for FrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        self.decode_from(src)
    }
}

#[cfg(feature = "tokio")]
impl tokio_util::codec::Encoder<Frame> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        self.encode_into(&frame, dst)
    }
}
