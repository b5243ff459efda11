//! Federated directory payloads.
//!
//! Registration is verified over a back-connection: the directory dials the
//! announced `hostname:port`, sends [`VerifyRegistration`] with a fresh
//! nonce, and expects [`VerifyResponse`] echoing it within the deadline.

use bytes::{BufMut, Bytes, BytesMut};

use super::{ServerEntry, Wire};
use crate::error::WireError;
use crate::wire::*;

/// LIST_SERVERS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListServers;

impl Wire for ListServers {
    fn encode(&self, _buf: &mut BytesMut) {}

    fn decode(_buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self)
    }
}

/// SERVER_LIST. Chat-only servers return an empty list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerList {
    /// Known, verified servers.
    pub servers: Vec<ServerEntry>,
}

impl Wire for ServerList {
    fn encode(&self, buf: &mut BytesMut) {
        put_list(buf, &self.servers, |b, s| s.encode(b));
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            servers: get_list(buf, ServerEntry::decode)?,
        })
    }
}

/// REGISTER_SERVER: announce this server to a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterServer {
    /// Publicly reachable hostname.
    pub hostname: String,
    /// Publicly reachable port.
    pub port: u16,
    /// Display name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Advertised user capacity.
    pub max_users: u32,
    /// Whether to list publicly.
    pub is_public: bool,
    /// Current channel count.
    pub channel_count: u32,
    /// Current user count.
    pub user_count: u32,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
}

impl Wire for RegisterServer {
    fn encode(&self, buf: &mut BytesMut) {
        put_string(buf, &self.hostname);
        buf.put_u16(self.port);
        put_string(buf, &self.name);
        put_string(buf, &self.description);
        buf.put_u32(self.max_users);
        put_bool(buf, self.is_public);
        buf.put_u32(self.channel_count);
        buf.put_u32(self.user_count);
        buf.put_u64(self.uptime_seconds);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            hostname: get_string(buf)?,
            port: get_u16(buf)?,
            name: get_string(buf)?,
            description: get_string(buf)?,
            max_users: get_u32(buf)?,
            is_public: get_bool(buf)?,
            channel_count: get_u32(buf)?,
            user_count: get_u32(buf)?,
            uptime_seconds: get_u64(buf)?,
        })
    }
}

/// REGISTER_ACK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterAck {
    /// Whether the registration was verified and stored.
    pub success: bool,
    /// Assigned heartbeat interval in seconds, on success.
    pub heartbeat_interval: u32,
    /// Failure detail.
    pub message: Option<String>,
}

impl Wire for RegisterAck {
    fn encode(&self, buf: &mut BytesMut) {
        put_bool(buf, self.success);
        buf.put_u32(self.heartbeat_interval);
        put_opt_string(buf, &self.message);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            success: get_bool(buf)?,
            heartbeat_interval: get_u32(buf)?,
            message: get_opt_string(buf)?,
        })
    }
}

/// HEARTBEAT: refresh a directory entry and its load figures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heartbeat {
    /// Hostname of the registered entry.
    pub hostname: String,
    /// Port of the registered entry.
    pub port: u16,
    /// Current user count.
    pub user_count: u32,
    /// Current channel count.
    pub channel_count: u32,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
}

impl Wire for Heartbeat {
    fn encode(&self, buf: &mut BytesMut) {
        put_string(buf, &self.hostname);
        buf.put_u16(self.port);
        buf.put_u32(self.user_count);
        buf.put_u32(self.channel_count);
        buf.put_u64(self.uptime_seconds);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            hostname: get_string(buf)?,
            port: get_u16(buf)?,
            user_count: get_u32(buf)?,
            channel_count: get_u32(buf)?,
            uptime_seconds: get_u64(buf)?,
        })
    }
}

/// HEARTBEAT_ACK: echoes the entry's assigned interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatAck {
    /// Assigned heartbeat interval in seconds.
    pub heartbeat_interval: u32,
}

impl Wire for HeartbeatAck {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.heartbeat_interval);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            heartbeat_interval: get_u32(buf)?,
        })
    }
}

/// VERIFY_REGISTRATION: challenge sent over the back-connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyRegistration {
    /// Fresh 64-bit nonce.
    pub challenge: u64,
}

impl Wire for VerifyRegistration {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.challenge);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            challenge: get_u64(buf)?,
        })
    }
}

/// VERIFY_RESPONSE: echo of the challenge nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyResponse {
    /// The nonce from [`VerifyRegistration`].
    pub challenge: u64,
}

impl Wire for VerifyResponse {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.challenge);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            challenge: get_u64(buf)?,
        })
    }
}
