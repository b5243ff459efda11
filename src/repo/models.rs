//! Persistent entity shapes as seen by the core.

use superchat_proto::messages::{BanInfo, ChannelInfo, SshKeyInfo, SubchannelInfo, UserEntry};

/// User flag bit: admin.
pub const FLAG_ADMIN: u32 = 1 << 0;

/// User flag bit: moderator.
pub const FLAG_MODERATOR: u32 = 1 << 1;

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: u64,
    /// Unique (case-insensitively), case-preserving.
    pub nickname: String,
    /// bcrypt wrap of the client's argon2 pre-hash; `None` for key-only users.
    pub password_hash: Option<String>,
    pub flags: u32,
    pub created_at: i64,
    /// X25519 public key for DMs, opaque to the server.
    pub encryption_public_key: Option<[u8; 32]>,
    pub allow_unencrypted_dms: bool,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.flags & FLAG_ADMIN != 0
    }

    pub fn entry(&self, online: bool) -> UserEntry {
        UserEntry {
            user_id: self.id,
            nickname: self.nickname.clone(),
            is_admin: self.is_admin(),
            online,
            created_at: self.created_at,
        }
    }
}

/// An SSH public key bound to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshKey {
    pub id: u64,
    pub user_id: u64,
    /// `SHA256:<base64>` over the decoded public-key blob; globally unique.
    pub fingerprint: String,
    pub key_type: String,
    pub label: String,
    pub added_at: i64,
    pub last_used_at: Option<i64>,
}

impl SshKey {
    pub fn info(&self) -> SshKeyInfo {
        SshKeyInfo {
            id: self.id,
            fingerprint: self.fingerprint.clone(),
            key_type: self.key_type.clone(),
            label: self.label.clone(),
            added_at: self.added_at,
            last_used_at: self.last_used_at,
        }
    }
}

/// Chat (linear) or forum (threaded) semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelType {
    Chat,
    Forum,
}

impl ChannelType {
    pub fn code(self) -> u8 {
        match self {
            ChannelType::Chat => 0,
            ChannelType::Forum => 1,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ChannelType::Chat),
            1 => Some(ChannelType::Forum),
            _ => None,
        }
    }
}

/// A channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub channel_type: ChannelType,
    /// 0 = keep forever.
    pub retention_hours: u32,
    pub has_subchannels: bool,
    pub is_private: bool,
    pub is_dm: bool,
    pub created_at: i64,
}

impl Channel {
    pub fn info(&self) -> ChannelInfo {
        ChannelInfo {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            channel_type: self.channel_type.code(),
            retention_hours: self.retention_hours,
            has_subchannels: self.has_subchannels,
            is_private: self.is_private,
            created_at: self.created_at,
        }
    }
}

/// A subchannel under a parent channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subchannel {
    pub id: u64,
    pub channel_id: u64,
    pub name: String,
    pub description: String,
    pub channel_type: ChannelType,
    pub retention_hours: u32,
}

impl Subchannel {
    pub fn info(&self) -> SubchannelInfo {
        SubchannelInfo {
            id: self.id,
            channel_id: self.channel_id,
            name: self.name.clone(),
            description: self.description.clone(),
            channel_type: self.channel_type.code(),
            retention_hours: self.retention_hours,
        }
    }
}

/// A stored message.
///
/// `author_nickname` is the frozen snapshot carried only when
/// `author_user_id` is absent; registered authors resolve their display
/// name from the live user row at read time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    /// Monotonic within the channel.
    pub id: u64,
    pub channel_id: u64,
    pub subchannel_id: Option<u64>,
    pub parent_id: Option<u64>,
    pub author_user_id: Option<u64>,
    pub author_nickname: Option<String>,
    pub content: Vec<u8>,
    pub encrypted: bool,
    pub created_at: i64,
    pub edited_at: Option<i64>,
    pub deleted_at: Option<i64>,
    /// `== id` for roots.
    pub thread_root_id: u64,
    /// 0 iff `parent_id` is absent.
    pub thread_depth: u32,
}

impl MessageRecord {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Fields supplied when persisting a new message.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub channel_id: u64,
    pub subchannel_id: Option<u64>,
    pub parent_id: Option<u64>,
    pub author_user_id: Option<u64>,
    /// Snapshot stored only for anonymous authors.
    pub author_nickname: Option<String>,
    pub content: Vec<u8>,
    pub encrypted: bool,
    pub created_at: i64,
}

/// Message query window.
///
/// Without `parent_id` this selects root messages; with it, the depth-first
/// preorder subtree of the parent (parent first, siblings by created_at
/// ascending). `before_id` takes precedence over `after_id`.
#[derive(Debug, Clone, Default)]
pub struct MessageQuery {
    pub channel_id: u64,
    pub subchannel_id: Option<u64>,
    pub parent_id: Option<u64>,
    pub before_id: Option<u64>,
    pub after_id: Option<u64>,
    pub limit: usize,
}

/// User ban or IP ban.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanKind {
    User,
    Ip,
}

impl BanKind {
    pub fn code(self) -> u8 {
        match self {
            BanKind::User => 0,
            BanKind::Ip => 1,
        }
    }
}

/// A moderation ban.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ban {
    pub id: u64,
    pub kind: BanKind,
    pub user_id: Option<u64>,
    pub nickname: Option<String>,
    pub ip_or_cidr: Option<String>,
    pub reason: String,
    pub shadow: bool,
    pub banned_at: i64,
    /// `None` = permanent.
    pub banned_until: Option<i64>,
    pub banned_by: String,
}

impl Ban {
    pub fn is_expired(&self, now: i64) -> bool {
        self.banned_until.is_some_and(|until| until < now)
    }

    pub fn info(&self) -> BanInfo {
        BanInfo {
            id: self.id,
            kind: self.kind.code(),
            user_id: self.user_id,
            nickname: self.nickname.clone(),
            ip_or_cidr: self.ip_or_cidr.clone(),
            reason: self.reason.clone(),
            shadow: self.shadow,
            banned_at: self.banned_at,
            banned_until: self.banned_until,
            banned_by: self.banned_by.clone(),
        }
    }
}

/// Fields supplied when placing a ban.
#[derive(Debug, Clone)]
pub struct NewBan {
    pub kind: BanKind,
    pub user_id: Option<u64>,
    pub nickname: Option<String>,
    pub ip_or_cidr: Option<String>,
    pub reason: String,
    pub shadow: bool,
    pub banned_at: i64,
    pub banned_until: Option<i64>,
    pub banned_by: String,
}

/// Per-user read watermark. Registered users only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadState {
    pub user_id: u64,
    pub channel_id: u64,
    pub subchannel_id: Option<u64>,
    pub last_read_at: i64,
}
