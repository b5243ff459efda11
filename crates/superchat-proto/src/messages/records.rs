//! Shared record shapes embedded in listing and event payloads.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::Wire;
use crate::error::WireError;
use crate::wire::*;

/// A channel as presented to clients. DM channels never appear in the
/// public listing, so `is_dm` is not carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    /// Channel id.
    pub id: u64,
    /// Unique channel name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// 0 = chat, 1 = forum.
    pub channel_type: u8,
    /// Message retention window in hours; 0 = keep forever.
    pub retention_hours: u32,
    /// Whether the channel has subchannels.
    pub has_subchannels: bool,
    /// Whether the channel is private.
    pub is_private: bool,
    /// Creation timestamp, UNIX ms.
    pub created_at: i64,
}

impl Wire for ChannelInfo {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.id);
        put_string(buf, &self.name);
        put_string(buf, &self.description);
        buf.put_u8(self.channel_type);
        buf.put_u32(self.retention_hours);
        put_bool(buf, self.has_subchannels);
        put_bool(buf, self.is_private);
        buf.put_i64(self.created_at);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            id: get_u64(buf)?,
            name: get_string(buf)?,
            description: get_string(buf)?,
            channel_type: get_u8(buf)?,
            retention_hours: get_u32(buf)?,
            has_subchannels: get_bool(buf)?,
            is_private: get_bool(buf)?,
            created_at: get_i64(buf)?,
        })
    }
}

/// A subchannel under a parent channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubchannelInfo {
    /// Subchannel id.
    pub id: u64,
    /// Parent channel id.
    pub channel_id: u64,
    /// Name, unique within the parent.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// 0 = chat, 1 = forum.
    pub channel_type: u8,
    /// Retention window in hours; 0 = keep forever.
    pub retention_hours: u32,
}

impl Wire for SubchannelInfo {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.id);
        buf.put_u64(self.channel_id);
        put_string(buf, &self.name);
        put_string(buf, &self.description);
        buf.put_u8(self.channel_type);
        buf.put_u32(self.retention_hours);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            id: get_u64(buf)?,
            channel_id: get_u64(buf)?,
            name: get_string(buf)?,
            description: get_string(buf)?,
            channel_type: get_u8(buf)?,
            retention_hours: get_u32(buf)?,
        })
    }
}

/// A message as rendered for clients.
///
/// `author_nickname` is the display name: the live nickname for registered
/// authors, the frozen snapshot prefixed with `~` for anonymous ones.
/// Deleted messages carry empty `content` and a set `deleted_at`.
/// `content` is raw bytes: UTF-8 for plaintext, ciphertext when `encrypted`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageInfo {
    /// Message id, monotonic within its channel.
    pub id: u64,
    /// Channel id.
    pub channel_id: u64,
    /// Subchannel id, if posted in one.
    pub subchannel_id: Option<u64>,
    /// Parent message id for replies.
    pub parent_id: Option<u64>,
    /// Author's user id; absent for anonymous authors.
    pub author_user_id: Option<u64>,
    /// Display name (see type docs).
    pub author_nickname: String,
    /// Message body bytes.
    pub content: Vec<u8>,
    /// Creation timestamp, UNIX ms.
    pub created_at: i64,
    /// Last-edit timestamp, if edited.
    pub edited_at: Option<i64>,
    /// Deletion timestamp, if soft-deleted.
    pub deleted_at: Option<i64>,
    /// Root ancestor id (`== id` for roots).
    pub thread_root_id: u64,
    /// Depth below the root (0 for roots).
    pub thread_depth: u32,
    /// Whether `content` is end-to-end ciphertext.
    pub encrypted: bool,
}

impl Wire for MessageInfo {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.id);
        buf.put_u64(self.channel_id);
        put_opt_u64(buf, self.subchannel_id);
        put_opt_u64(buf, self.parent_id);
        put_opt_u64(buf, self.author_user_id);
        put_string(buf, &self.author_nickname);
        put_blob(buf, &self.content);
        buf.put_i64(self.created_at);
        put_opt_i64(buf, self.edited_at);
        put_opt_i64(buf, self.deleted_at);
        buf.put_u64(self.thread_root_id);
        buf.put_u32(self.thread_depth);
        put_bool(buf, self.encrypted);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            id: get_u64(buf)?,
            channel_id: get_u64(buf)?,
            subchannel_id: get_opt_u64(buf)?,
            parent_id: get_opt_u64(buf)?,
            author_user_id: get_opt_u64(buf)?,
            author_nickname: get_string(buf)?,
            content: get_blob(buf)?,
            created_at: get_i64(buf)?,
            edited_at: get_opt_i64(buf)?,
            deleted_at: get_opt_i64(buf)?,
            thread_root_id: get_u64(buf)?,
            thread_depth: get_u32(buf)?,
            encrypted: get_bool(buf)?,
        })
    }
}

/// An SSH key attached to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshKeyInfo {
    /// Key id.
    pub id: u64,
    /// SHA-256 fingerprint of the public key blob.
    pub fingerprint: String,
    /// Key algorithm name (e.g. `ssh-ed25519`).
    pub key_type: String,
    /// User-chosen label.
    pub label: String,
    /// When the key was added, UNIX ms.
    pub added_at: i64,
    /// Last successful authentication, UNIX ms.
    pub last_used_at: Option<i64>,
}

impl Wire for SshKeyInfo {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.id);
        put_string(buf, &self.fingerprint);
        put_string(buf, &self.key_type);
        put_string(buf, &self.label);
        buf.put_i64(self.added_at);
        put_opt_i64(buf, self.last_used_at);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            id: get_u64(buf)?,
            fingerprint: get_string(buf)?,
            key_type: get_string(buf)?,
            label: get_string(buf)?,
            added_at: get_i64(buf)?,
            last_used_at: get_opt_i64(buf)?,
        })
    }
}

/// A ban as listed for admins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanInfo {
    /// Ban id.
    pub id: u64,
    /// 0 = user ban, 1 = IP ban.
    pub kind: u8,
    /// Banned user id, for user bans on registered users.
    pub user_id: Option<u64>,
    /// Banned nickname, for user bans.
    pub nickname: Option<String>,
    /// Banned IP or CIDR, for IP bans.
    pub ip_or_cidr: Option<String>,
    /// Operator-supplied reason.
    pub reason: String,
    /// Whether the ban is a shadowban.
    pub shadow: bool,
    /// When the ban was placed, UNIX ms.
    pub banned_at: i64,
    /// Expiry, UNIX ms; absent = permanent.
    pub banned_until: Option<i64>,
    /// Nickname of the banning admin.
    pub banned_by: String,
}

impl Wire for BanInfo {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.id);
        buf.put_u8(self.kind);
        put_opt_u64(buf, self.user_id);
        put_opt_string(buf, &self.nickname);
        put_opt_string(buf, &self.ip_or_cidr);
        put_string(buf, &self.reason);
        put_bool(buf, self.shadow);
        buf.put_i64(self.banned_at);
        put_opt_i64(buf, self.banned_until);
        put_string(buf, &self.banned_by);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            id: get_u64(buf)?,
            kind: get_u8(buf)?,
            user_id: get_opt_u64(buf)?,
            nickname: get_opt_string(buf)?,
            ip_or_cidr: get_opt_string(buf)?,
            reason: get_string(buf)?,
            shadow: get_bool(buf)?,
            banned_at: get_i64(buf)?,
            banned_until: get_opt_i64(buf)?,
            banned_by: get_string(buf)?,
        })
    }
}

/// A directory entry as returned by LIST_SERVERS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEntry {
    /// Announced hostname.
    pub hostname: String,
    /// Announced port.
    pub port: u16,
    /// Display name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Advertised user capacity.
    pub max_users: u32,
    /// Whether the server is publicly listed.
    pub is_public: bool,
    /// Channel count at last heartbeat.
    pub channel_count: u32,
    /// User count at last heartbeat.
    pub user_count: u32,
    /// Uptime at last heartbeat.
    pub uptime_seconds: u64,
}

impl Wire for ServerEntry {
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

/// One row of a registered-user listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntry {
    /// User id.
    pub user_id: u64,
    /// Current nickname.
    pub nickname: String,
    /// Whether the user has the admin flag.
    pub is_admin: bool,
    /// Whether at least one session is authenticated as this user.
    pub online: bool,
    /// Registration timestamp, UNIX ms.
    pub created_at: i64,
}

impl Wire for UserEntry {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.user_id);
        put_string(buf, &self.nickname);
        put_bool(buf, self.is_admin);
        put_bool(buf, self.online);
        buf.put_i64(self.created_at);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            user_id: get_u64(buf)?,
            nickname: get_string(buf)?,
            is_admin: get_bool(buf)?,
            online: get_bool(buf)?,
            created_at: get_i64(buf)?,
        })
    }
}

/// Unread count for one channel, subchannel, or thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreadEntry {
    /// Channel id.
    pub channel_id: u64,
    /// Subchannel scope, if any.
    pub subchannel_id: Option<u64>,
    /// Thread scope, if any.
    pub thread_root_id: Option<u64>,
    /// Messages newer than the stored watermark.
    pub count: u32,
}

impl Wire for UnreadEntry {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.channel_id);
        put_opt_u64(buf, self.subchannel_id);
        put_opt_u64(buf, self.thread_root_id);
        buf.put_u32(self.count);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            channel_id: get_u64(buf)?,
            subchannel_id: get_opt_u64(buf)?,
            thread_root_id: get_opt_u64(buf)?,
            count: get_u32(buf)?,
        })
    }
}

/// How a START_DM names its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DmTarget {
    /// A registered user by id.
    UserId(u64),
    /// A nickname; registered users are preferred over anonymous sessions.
    Nickname(String),
    /// A specific live session.
    SessionId(u64),
}

impl Wire for DmTarget {
    fn encode(&self, buf: &mut BytesMut) {
        match self {
            DmTarget::UserId(id) => {
                buf.put_u8(0);
                buf.put_u64(*id);
            }
            DmTarget::Nickname(nick) => {
                buf.put_u8(1);
                put_string(buf, nick);
            }
            DmTarget::SessionId(id) => {
                buf.put_u8(2);
                buf.put_u64(*id);
            }
        }
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        match get_u8(buf)? {
            0 => Ok(DmTarget::UserId(get_u64(buf)?)),
            1 => Ok(DmTarget::Nickname(get_string(buf)?)),
            2 => Ok(DmTarget::SessionId(get_u64(buf)?)),
            value => Err(WireError::InvalidDiscriminant {
                what: "dm target",
                value,
            }),
        }
    }
}
