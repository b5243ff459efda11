//! Keepalive, lifecycle, error, config, and presence payloads.

use bytes::{BufMut, Bytes, BytesMut};

use super::Wire;
use crate::error::{ErrorCode, WireError};
use crate::wire::*;

/// PING. The only message that advances the idle timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ping {
    /// Client timestamp, echoed back in PONG.
    pub timestamp: i64,
}

impl Wire for Ping {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i64(self.timestamp);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            timestamp: get_i64(buf)?,
        })
    }
}

/// PONG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pong {
    /// The timestamp from the PING.
    pub timestamp: i64,
}

impl Wire for Pong {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i64(self.timestamp);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            timestamp: get_i64(buf)?,
        })
    }
}

/// DISCONNECT: polite client goodbye.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Disconnect {
    /// Optional reason.
    pub reason: Option<String>,
}

impl Wire for Disconnect {
    fn encode(&self, buf: &mut BytesMut) {
        put_opt_string(buf, &self.reason);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            reason: get_opt_string(buf)?,
        })
    }
}

/// SERVER_DISCONNECT: server-initiated close with reason
/// (e.g. "banned", "Session timeout", "slow consumer",
/// "Server shutting down").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDisconnect {
    /// Why the server is closing the connection.
    pub reason: String,
}

impl Wire for ServerDisconnect {
    fn encode(&self, buf: &mut BytesMut) {
        put_string(buf, &self.reason);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            reason: get_string(buf)?,
        })
    }
}

/// ERROR with a stable numeric code (see [`ErrorCode`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMessage {
    /// Numeric code.
    pub code: u32,
    /// Human-readable detail.
    pub message: String,
}

impl ErrorMessage {
    /// Build from a typed code.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
        }
    }

    /// The typed code, if recognized.
    pub fn error_code(&self) -> Option<ErrorCode> {
        ErrorCode::from_code(self.code)
    }
}

impl Wire for ErrorMessage {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.code);
        put_string(buf, &self.message);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            code: get_u32(buf)?,
            message: get_string(buf)?,
        })
    }
}

/// SERVER_CONFIG, sent immediately after accept. Field order is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    /// Protocol version the server speaks.
    pub protocol_version: u8,
    /// Message rate limit, per minute.
    pub max_message_rate: u16,
    /// Channel-creation limit, per hour.
    pub max_channel_creates: u16,
    /// Days before inactive cleanup.
    pub inactive_cleanup_days: u16,
    /// Connection cap per source IP.
    pub max_connections_per_ip: u8,
    /// Maximum message content length, bytes.
    pub max_message_length: u32,
    /// Maximum thread subscriptions per session.
    pub max_thread_subs: u16,
    /// Maximum channel subscriptions per session.
    pub max_channel_subs: u16,
    /// Whether this server accepts directory registrations.
    pub directory_enabled: bool,
}

impl Wire for ServerConfig {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.protocol_version);
        buf.put_u16(self.max_message_rate);
        buf.put_u16(self.max_channel_creates);
        buf.put_u16(self.inactive_cleanup_days);
        buf.put_u8(self.max_connections_per_ip);
        buf.put_u32(self.max_message_length);
        buf.put_u16(self.max_thread_subs);
        buf.put_u16(self.max_channel_subs);
        put_bool(buf, self.directory_enabled);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            protocol_version: get_u8(buf)?,
            max_message_rate: get_u16(buf)?,
            max_channel_creates: get_u16(buf)?,
            inactive_cleanup_days: get_u16(buf)?,
            max_connections_per_ip: get_u8(buf)?,
            max_message_length: get_u32(buf)?,
            max_thread_subs: get_u16(buf)?,
            max_channel_subs: get_u16(buf)?,
            directory_enabled: get_bool(buf)?,
        })
    }
}

/// CHANNEL_PRESENCE: a session joined or left a channel roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPresence {
    /// The channel.
    pub channel_id: u64,
    /// Display name of the session.
    pub nickname: String,
    /// True for join, false for leave.
    pub joined: bool,
}

impl Wire for ChannelPresence {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.channel_id);
        put_string(buf, &self.nickname);
        put_bool(buf, self.joined);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            channel_id: get_u64(buf)?,
            nickname: get_string(buf)?,
            joined: get_bool(buf)?,
        })
    }
}

/// SERVER_PRESENCE: a named session connected or disconnected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerPresence {
    /// Display name of the session.
    pub nickname: String,
    /// True for online, false for offline.
    pub online: bool,
}

impl Wire for ServerPresence {
    fn encode(&self, buf: &mut BytesMut) {
        put_string(buf, &self.nickname);
        put_bool(buf, self.online);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            nickname: get_string(buf)?,
            online: get_bool(buf)?,
        })
    }
}
