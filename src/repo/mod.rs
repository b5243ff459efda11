//! Persistence contract.
//!
//! The core never sees SQL; it talks to [`Repository`], an async trait
//! covering every aggregate plus the paginated message queries, unread
//! counts, and the retention sweep. The in-tree implementation is
//! [`MemoryRepository`]; a SQL-backed implementation plugs in behind the
//! same trait.
//!
//! Single-aggregate operations are serializable within that aggregate.
//! `delete_user` is the one cross-aggregate transaction: it NULLs message
//! authorship (snapshotting the display nickname), cascades SSH keys, user
//! bans, and read state in one logical step.

mod memory;
mod models;

pub use memory::MemoryRepository;
pub use models::*;

use async_trait::async_trait;
use thiserror::Error;

/// Repository failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RepoError {
    #[error("user not found")]
    UserNotFound,
    #[error("channel not found")]
    ChannelNotFound,
    #[error("subchannel not found")]
    SubchannelNotFound,
    #[error("message not found")]
    MessageNotFound,
    #[error("ssh key not found")]
    KeyNotFound,
    #[error("ban not found")]
    BanNotFound,
    #[error("nickname already registered: {0}")]
    NicknameTaken(String),
    #[error("name already exists: {0}")]
    NameConflict(String),
    #[error("ssh key fingerprint already registered")]
    FingerprintConflict,
    #[error("storage failure: {0}")]
    Storage(String),
}

/// Result alias for repository calls.
pub type RepoResult<T> = Result<T, RepoError>;

/// The persistence contract the core is written against.
#[async_trait]
pub trait Repository: Send + Sync + 'static {
    // -- users ------------------------------------------------------------

    /// Create a user. Nickname uniqueness is enforced here; a concurrent
    /// duplicate registration loses with [`RepoError::NicknameTaken`].
    async fn create_user(
        &self,
        nickname: &str,
        password_hash: Option<String>,
        flags: u32,
        now: i64,
    ) -> RepoResult<User>;

    async fn user_by_id(&self, id: u64) -> RepoResult<Option<User>>;

    /// Case-insensitive lookup; the stored case is preserved in the result.
    async fn user_by_nickname(&self, nickname: &str) -> RepoResult<Option<User>>;

    async fn update_nickname(&self, user_id: u64, nickname: &str) -> RepoResult<User>;

    async fn update_password(&self, user_id: u64, password_hash: Option<String>) -> RepoResult<()>;

    async fn set_encryption_key(&self, user_id: u64, key: Option<[u8; 32]>) -> RepoResult<()>;

    async fn set_allow_unencrypted(&self, user_id: u64, allow: bool) -> RepoResult<()>;

    async fn list_users(&self) -> RepoResult<Vec<User>>;

    /// Delete a user and cascade in one logical transaction.
    async fn delete_user(&self, user_id: u64) -> RepoResult<User>;

    // -- ssh keys ---------------------------------------------------------

    async fn add_ssh_key(
        &self,
        user_id: u64,
        fingerprint: &str,
        key_type: &str,
        label: &str,
        now: i64,
    ) -> RepoResult<SshKey>;

    /// Resolve a verified fingerprint to its key and owner.
    async fn ssh_key_by_fingerprint(&self, fingerprint: &str)
        -> RepoResult<Option<(SshKey, User)>>;

    async fn list_ssh_keys(&self, user_id: u64) -> RepoResult<Vec<SshKey>>;

    async fn update_ssh_key_label(&self, user_id: u64, key_id: u64, label: &str) -> RepoResult<()>;

    async fn delete_ssh_key(&self, user_id: u64, key_id: u64) -> RepoResult<()>;

    async fn touch_ssh_key(&self, key_id: u64, now: i64) -> RepoResult<()>;

    async fn count_ssh_keys(&self, user_id: u64) -> RepoResult<usize>;

    // -- channels ---------------------------------------------------------

    async fn create_channel(
        &self,
        name: &str,
        description: &str,
        channel_type: ChannelType,
        retention_hours: u32,
        is_private: bool,
        is_dm: bool,
        now: i64,
    ) -> RepoResult<Channel>;

    async fn channel_by_id(&self, id: u64) -> RepoResult<Option<Channel>>;

    async fn channel_by_name(&self, name: &str) -> RepoResult<Option<Channel>>;

    /// Public channels only; DM channels never appear here.
    async fn list_channels(&self) -> RepoResult<Vec<Channel>>;

    /// Remove a channel, its subchannels, and its messages.
    async fn delete_channel(&self, id: u64) -> RepoResult<Channel>;

    async fn create_subchannel(
        &self,
        channel_id: u64,
        name: &str,
        description: &str,
        channel_type: ChannelType,
        retention_hours: u32,
    ) -> RepoResult<Subchannel>;

    async fn subchannel_by_id(&self, id: u64) -> RepoResult<Option<Subchannel>>;

    async fn subchannels(&self, channel_id: u64) -> RepoResult<Vec<Subchannel>>;

    // -- messages ---------------------------------------------------------

    /// Persist a message, assigning the per-channel monotonic id and the
    /// thread linkage (`thread_root_id`, `thread_depth`).
    async fn create_message(&self, new: NewMessage) -> RepoResult<MessageRecord>;

    async fn message_by_id(&self, channel_id: u64, message_id: u64)
        -> RepoResult<Option<MessageRecord>>;

    async fn edit_message(
        &self,
        channel_id: u64,
        message_id: u64,
        content: Vec<u8>,
        now: i64,
    ) -> RepoResult<MessageRecord>;

    /// Soft deletion: sets `deleted_at`, clears content, keeps structure.
    async fn delete_message(
        &self,
        channel_id: u64,
        message_id: u64,
        now: i64,
    ) -> RepoResult<MessageRecord>;

    async fn list_messages(&self, query: MessageQuery) -> RepoResult<Vec<MessageRecord>>;

    /// Count non-deleted messages newer than `since` in the given scope.
    async fn count_messages_since(
        &self,
        channel_id: u64,
        subchannel_id: Option<u64>,
        thread_root_id: Option<u64>,
        since: i64,
    ) -> RepoResult<u32>;

    /// Purge up to `batch` messages past their retention window.
    /// Returns the number purged; callers loop until it reports zero.
    async fn purge_expired(&self, now: i64, batch: usize) -> RepoResult<usize>;

    // -- read state -------------------------------------------------------

    async fn set_read_state(&self, state: ReadState) -> RepoResult<()>;

    async fn read_states(&self, user_id: u64) -> RepoResult<Vec<ReadState>>;

    // -- bans -------------------------------------------------------------

    async fn add_ban(&self, ban: NewBan) -> RepoResult<Ban>;

    async fn remove_ban(&self, ban_id: u64) -> RepoResult<Ban>;

    /// Bans, newest first. Expired bans are filtered out unless requested.
    async fn list_bans(&self, include_expired: bool, now: i64) -> RepoResult<Vec<Ban>>;
}
