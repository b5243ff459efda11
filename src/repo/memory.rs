//! In-memory repository.
//!
//! Tables are `parking_lot::RwLock`-guarded maps; ids come from per-table
//! counters. Locks are always taken in table-declaration order (users,
//! keys, channels, messages, read_state, bans) so multi-table operations
//! cannot deadlock, and no lock is held across an await point.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::models::*;
use super::{RepoError, RepoResult, Repository};

#[derive(Default)]
struct Users {
    by_id: HashMap<u64, User>,
    /// Lowercased nickname -> id. Uniqueness is case-insensitive while the
    /// stored nickname keeps its case.
    by_nick: HashMap<String, u64>,
    next_id: u64,
}

#[derive(Default)]
struct Keys {
    by_id: HashMap<u64, SshKey>,
    by_fingerprint: HashMap<String, u64>,
    next_id: u64,
}

#[derive(Default)]
struct Channels {
    by_id: HashMap<u64, Channel>,
    by_name: HashMap<String, u64>,
    subs_by_id: HashMap<u64, Subchannel>,
    next_channel_id: u64,
    next_subchannel_id: u64,
}

#[derive(Default)]
struct ChannelMessages {
    by_id: BTreeMap<u64, MessageRecord>,
    /// Parent id -> child ids in insertion (= created_at) order.
    children: HashMap<u64, Vec<u64>>,
    next_id: u64,
}

#[derive(Default)]
struct Bans {
    by_id: BTreeMap<u64, Ban>,
    next_id: u64,
}

/// The in-tree [`Repository`] implementation.
#[derive(Default)]
pub struct MemoryRepository {
    users: RwLock<Users>,
    keys: RwLock<Keys>,
    channels: RwLock<Channels>,
    messages: RwLock<HashMap<u64, ChannelMessages>>,
    read_state: RwLock<HashMap<(u64, u64, Option<u64>), i64>>,
    bans: RwLock<Bans>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn fold(nickname: &str) -> String {
        nickname.to_lowercase()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn create_user(
        &self,
        nickname: &str,
        password_hash: Option<String>,
        flags: u32,
        now: i64,
    ) -> RepoResult<User> {
        let mut users = self.users.write();
        let key = Self::fold(nickname);
        if users.by_nick.contains_key(&key) {
            return Err(RepoError::NicknameTaken(nickname.to_string()));
        }
        users.next_id += 1;
        let user = User {
            id: users.next_id,
            nickname: nickname.to_string(),
            password_hash,
            flags,
            created_at: now,
            encryption_public_key: None,
            allow_unencrypted_dms: false,
        };
        users.by_nick.insert(key, user.id);
        users.by_id.insert(user.id, user.clone());
        Ok(user)
    }

    async fn user_by_id(&self, id: u64) -> RepoResult<Option<User>> {
        Ok(self.users.read().by_id.get(&id).cloned())
    }

    async fn user_by_nickname(&self, nickname: &str) -> RepoResult<Option<User>> {
        let users = self.users.read();
        Ok(users
            .by_nick
            .get(&Self::fold(nickname))
            .and_then(|id| users.by_id.get(id))
            .cloned())
    }

    async fn update_nickname(&self, user_id: u64, nickname: &str) -> RepoResult<User> {
        let mut users = self.users.write();
        let key = Self::fold(nickname);
        if let Some(&holder) = users.by_nick.get(&key) {
            if holder != user_id {
                return Err(RepoError::NicknameTaken(nickname.to_string()));
            }
        }
        let old_key = {
            let user = users.by_id.get(&user_id).ok_or(RepoError::UserNotFound)?;
            Self::fold(&user.nickname)
        };
        users.by_nick.remove(&old_key);
        users.by_nick.insert(key, user_id);
        let user = users.by_id.get_mut(&user_id).ok_or(RepoError::UserNotFound)?;
        user.nickname = nickname.to_string();
        Ok(user.clone())
    }

    async fn update_password(&self, user_id: u64, password_hash: Option<String>) -> RepoResult<()> {
        let mut users = self.users.write();
        let user = users.by_id.get_mut(&user_id).ok_or(RepoError::UserNotFound)?;
        user.password_hash = password_hash;
        Ok(())
    }

    async fn set_encryption_key(&self, user_id: u64, key: Option<[u8; 32]>) -> RepoResult<()> {
        let mut users = self.users.write();
        let user = users.by_id.get_mut(&user_id).ok_or(RepoError::UserNotFound)?;
        user.encryption_public_key = key;
        Ok(())
    }

    async fn set_allow_unencrypted(&self, user_id: u64, allow: bool) -> RepoResult<()> {
        let mut users = self.users.write();
        let user = users.by_id.get_mut(&user_id).ok_or(RepoError::UserNotFound)?;
        user.allow_unencrypted_dms = allow;
        Ok(())
    }

    async fn list_users(&self) -> RepoResult<Vec<User>> {
        let users = self.users.read();
        let mut out: Vec<User> = users.by_id.values().cloned().collect();
        out.sort_by_key(|u| u.id);
        Ok(out)
    }

    async fn delete_user(&self, user_id: u64) -> RepoResult<User> {
        // Single logical transaction: hold every affected table write lock
        // for the duration, in declaration order.
        let mut users = self.users.write();
        let mut keys = self.keys.write();
        let mut messages = self.messages.write();
        let mut read_state = self.read_state.write();
        let mut bans = self.bans.write();

        let user = users.by_id.remove(&user_id).ok_or(RepoError::UserNotFound)?;
        users.by_nick.remove(&Self::fold(&user.nickname));

        let doomed: Vec<u64> = keys
            .by_id
            .values()
            .filter(|k| k.user_id == user_id)
            .map(|k| k.id)
            .collect();
        for key_id in doomed {
            if let Some(key) = keys.by_id.remove(&key_id) {
                keys.by_fingerprint.remove(&key.fingerprint);
            }
        }

        // NULL authorship, snapshotting the display nickname.
        for channel in messages.values_mut() {
            for msg in channel.by_id.values_mut() {
                if msg.author_user_id == Some(user_id) {
                    msg.author_user_id = None;
                    msg.author_nickname = Some(user.nickname.clone());
                }
            }
        }

        read_state.retain(|(uid, _, _), _| *uid != user_id);
        bans.by_id.retain(|_, ban| ban.user_id != Some(user_id));

        Ok(user)
    }

    async fn add_ssh_key(
        &self,
        user_id: u64,
        fingerprint: &str,
        key_type: &str,
        label: &str,
        now: i64,
    ) -> RepoResult<SshKey> {
        {
            let users = self.users.read();
            if !users.by_id.contains_key(&user_id) {
                return Err(RepoError::UserNotFound);
            }
        }
        let mut keys = self.keys.write();
        if keys.by_fingerprint.contains_key(fingerprint) {
            return Err(RepoError::FingerprintConflict);
        }
        keys.next_id += 1;
        let key = SshKey {
            id: keys.next_id,
            user_id,
            fingerprint: fingerprint.to_string(),
            key_type: key_type.to_string(),
            label: label.to_string(),
            added_at: now,
            last_used_at: None,
        };
        keys.by_fingerprint.insert(key.fingerprint.clone(), key.id);
        keys.by_id.insert(key.id, key.clone());
        Ok(key)
    }

    async fn ssh_key_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> RepoResult<Option<(SshKey, User)>> {
        let users = self.users.read();
        let keys = self.keys.read();
        let Some(key) = keys
            .by_fingerprint
            .get(fingerprint)
            .and_then(|id| keys.by_id.get(id))
        else {
            return Ok(None);
        };
        let user = users
            .by_id
            .get(&key.user_id)
            .cloned()
            .ok_or_else(|| RepoError::Storage("ssh key without owner".into()))?;
        Ok(Some((key.clone(), user)))
    }

    async fn list_ssh_keys(&self, user_id: u64) -> RepoResult<Vec<SshKey>> {
        let keys = self.keys.read();
        let mut out: Vec<SshKey> = keys
            .by_id
            .values()
            .filter(|k| k.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by_key(|k| k.id);
        Ok(out)
    }

    async fn update_ssh_key_label(&self, user_id: u64, key_id: u64, label: &str) -> RepoResult<()> {
        let mut keys = self.keys.write();
        let key = keys.by_id.get_mut(&key_id).ok_or(RepoError::KeyNotFound)?;
        if key.user_id != user_id {
            return Err(RepoError::KeyNotFound);
        }
        key.label = label.to_string();
        Ok(())
    }

    async fn delete_ssh_key(&self, user_id: u64, key_id: u64) -> RepoResult<()> {
        let mut keys = self.keys.write();
        match keys.by_id.get(&key_id) {
            Some(key) if key.user_id == user_id => {
                let fingerprint = key.fingerprint.clone();
                keys.by_id.remove(&key_id);
                keys.by_fingerprint.remove(&fingerprint);
                Ok(())
            }
            _ => Err(RepoError::KeyNotFound),
        }
    }

    async fn touch_ssh_key(&self, key_id: u64, now: i64) -> RepoResult<()> {
        let mut keys = self.keys.write();
        let key = keys.by_id.get_mut(&key_id).ok_or(RepoError::KeyNotFound)?;
        key.last_used_at = Some(now);
        Ok(())
    }

    async fn count_ssh_keys(&self, user_id: u64) -> RepoResult<usize> {
        Ok(self
            .keys
            .read()
            .by_id
            .values()
            .filter(|k| k.user_id == user_id)
            .count())
    }

    async fn create_channel(
        &self,
        name: &str,
        description: &str,
        channel_type: ChannelType,
        retention_hours: u32,
        is_private: bool,
        is_dm: bool,
        now: i64,
    ) -> RepoResult<Channel> {
        let mut channels = self.channels.write();
        let key = Self::fold(name);
        if channels.by_name.contains_key(&key) {
            return Err(RepoError::NameConflict(name.to_string()));
        }
        channels.next_channel_id += 1;
        let channel = Channel {
            id: channels.next_channel_id,
            name: name.to_string(),
            description: description.to_string(),
            channel_type,
            retention_hours,
            has_subchannels: false,
            is_private,
            is_dm,
            created_at: now,
        };
        channels.by_name.insert(key, channel.id);
        channels.by_id.insert(channel.id, channel.clone());
        Ok(channel)
    }

    async fn channel_by_id(&self, id: u64) -> RepoResult<Option<Channel>> {
        Ok(self.channels.read().by_id.get(&id).cloned())
    }

    async fn channel_by_name(&self, name: &str) -> RepoResult<Option<Channel>> {
        let channels = self.channels.read();
        Ok(channels
            .by_name
            .get(&Self::fold(name))
            .and_then(|id| channels.by_id.get(id))
            .cloned())
    }

    async fn list_channels(&self) -> RepoResult<Vec<Channel>> {
        let channels = self.channels.read();
        let mut out: Vec<Channel> = channels
            .by_id
            .values()
            .filter(|c| !c.is_dm)
            .cloned()
            .collect();
        out.sort_by_key(|c| c.id);
        Ok(out)
    }

    async fn delete_channel(&self, id: u64) -> RepoResult<Channel> {
        let mut channels = self.channels.write();
        let mut messages = self.messages.write();
        let mut read_state = self.read_state.write();

        let channel = channels.by_id.remove(&id).ok_or(RepoError::ChannelNotFound)?;
        channels.by_name.remove(&Self::fold(&channel.name));
        channels.subs_by_id.retain(|_, sub| sub.channel_id != id);
        messages.remove(&id);
        read_state.retain(|(_, channel_id, _), _| *channel_id != id);
        Ok(channel)
    }

    async fn create_subchannel(
        &self,
        channel_id: u64,
        name: &str,
        description: &str,
        channel_type: ChannelType,
        retention_hours: u32,
    ) -> RepoResult<Subchannel> {
        let mut channels = self.channels.write();
        if !channels.by_id.contains_key(&channel_id) {
            return Err(RepoError::ChannelNotFound);
        }
        let key = Self::fold(name);
        let duplicate = channels
            .subs_by_id
            .values()
            .any(|s| s.channel_id == channel_id && Self::fold(&s.name) == key);
        if duplicate {
            return Err(RepoError::NameConflict(name.to_string()));
        }
        channels.next_subchannel_id += 1;
        let sub = Subchannel {
            id: channels.next_subchannel_id,
            channel_id,
            name: name.to_string(),
            description: description.to_string(),
            channel_type,
            retention_hours,
        };
        channels.subs_by_id.insert(sub.id, sub.clone());
        if let Some(channel) = channels.by_id.get_mut(&channel_id) {
            channel.has_subchannels = true;
        }
        Ok(sub)
    }

    async fn subchannel_by_id(&self, id: u64) -> RepoResult<Option<Subchannel>> {
        Ok(self.channels.read().subs_by_id.get(&id).cloned())
    }

    async fn subchannels(&self, channel_id: u64) -> RepoResult<Vec<Subchannel>> {
        let channels = self.channels.read();
        let mut out: Vec<Subchannel> = channels
            .subs_by_id
            .values()
            .filter(|s| s.channel_id == channel_id)
            .cloned()
            .collect();
        out.sort_by_key(|s| s.id);
        Ok(out)
    }

    async fn create_message(&self, new: NewMessage) -> RepoResult<MessageRecord> {
        let channels = self.channels.read();
        if !channels.by_id.contains_key(&new.channel_id) {
            return Err(RepoError::ChannelNotFound);
        }
        if let Some(sub_id) = new.subchannel_id {
            let valid = channels
                .subs_by_id
                .get(&sub_id)
                .is_some_and(|s| s.channel_id == new.channel_id);
            if !valid {
                return Err(RepoError::SubchannelNotFound);
            }
        }

        let mut messages = self.messages.write();
        let channel = messages.entry(new.channel_id).or_default();

        let (thread_root_id, thread_depth, subchannel_id) = match new.parent_id {
            Some(parent_id) => {
                let parent = channel
                    .by_id
                    .get(&parent_id)
                    .ok_or(RepoError::MessageNotFound)?;
                // Replies live where their parent lives.
                (parent.thread_root_id, parent.thread_depth + 1, parent.subchannel_id)
            }
            None => (0, 0, new.subchannel_id),
        };

        channel.next_id += 1;
        let id = channel.next_id;
        let record = MessageRecord {
            id,
            channel_id: new.channel_id,
            subchannel_id,
            parent_id: new.parent_id,
            author_user_id: new.author_user_id,
            author_nickname: new.author_nickname,
            content: new.content,
            encrypted: new.encrypted,
            created_at: new.created_at,
            edited_at: None,
            deleted_at: None,
            thread_root_id: if new.parent_id.is_none() { id } else { thread_root_id },
            thread_depth,
        };
        if let Some(parent_id) = new.parent_id {
            channel.children.entry(parent_id).or_default().push(id);
        }
        channel.by_id.insert(id, record.clone());
        Ok(record)
    }

    async fn message_by_id(
        &self,
        channel_id: u64,
        message_id: u64,
    ) -> RepoResult<Option<MessageRecord>> {
        Ok(self
            .messages
            .read()
            .get(&channel_id)
            .and_then(|c| c.by_id.get(&message_id))
            .cloned())
    }

    async fn edit_message(
        &self,
        channel_id: u64,
        message_id: u64,
        content: Vec<u8>,
        now: i64,
    ) -> RepoResult<MessageRecord> {
        let mut messages = self.messages.write();
        let msg = messages
            .get_mut(&channel_id)
            .and_then(|c| c.by_id.get_mut(&message_id))
            .ok_or(RepoError::MessageNotFound)?;
        if msg.is_deleted() {
            return Err(RepoError::MessageNotFound);
        }
        msg.content = content;
        msg.edited_at = Some(now);
        Ok(msg.clone())
    }

    async fn delete_message(
        &self,
        channel_id: u64,
        message_id: u64,
        now: i64,
    ) -> RepoResult<MessageRecord> {
        let mut messages = self.messages.write();
        let msg = messages
            .get_mut(&channel_id)
            .and_then(|c| c.by_id.get_mut(&message_id))
            .ok_or(RepoError::MessageNotFound)?;
        if msg.deleted_at.is_none() {
            msg.deleted_at = Some(now);
            msg.content.clear();
        }
        Ok(msg.clone())
    }

    async fn list_messages(&self, query: MessageQuery) -> RepoResult<Vec<MessageRecord>> {
        let messages = self.messages.read();
        let Some(channel) = messages.get(&query.channel_id) else {
            return Ok(Vec::new());
        };
        let limit = query.limit.clamp(1, 200);

        if let Some(parent_id) = query.parent_id {
            // Depth-first preorder: parent first, siblings ascending.
            let parent = channel
                .by_id
                .get(&parent_id)
                .ok_or(RepoError::MessageNotFound)?;
            let mut out = Vec::with_capacity(limit.min(64));
            let mut stack: Vec<u64> = vec![parent.id];
            while let Some(id) = stack.pop() {
                if out.len() >= limit {
                    break;
                }
                if let Some(msg) = channel.by_id.get(&id) {
                    out.push(msg.clone());
                }
                if let Some(children) = channel.children.get(&id) {
                    for &child in children.iter().rev() {
                        stack.push(child);
                    }
                }
            }
            return Ok(out);
        }

        // Root listing, ascending; the cursor selects the window.
        let roots = channel.by_id.values().filter(|m| {
            m.parent_id.is_none() && m.subchannel_id == query.subchannel_id
        });

        let window: Vec<MessageRecord> = if let Some(before) = query.before_id {
            let below: Vec<MessageRecord> =
                roots.filter(|m| m.id < before).cloned().collect();
            below[below.len().saturating_sub(limit)..].to_vec()
        } else if let Some(after) = query.after_id {
            roots.filter(|m| m.id > after).take(limit).cloned().collect()
        } else {
            let all: Vec<MessageRecord> = roots.cloned().collect();
            all[all.len().saturating_sub(limit)..].to_vec()
        };
        Ok(window)
    }

    async fn count_messages_since(
        &self,
        channel_id: u64,
        subchannel_id: Option<u64>,
        thread_root_id: Option<u64>,
        since: i64,
    ) -> RepoResult<u32> {
        let messages = self.messages.read();
        let Some(channel) = messages.get(&channel_id) else {
            return Ok(0);
        };
        let count = channel
            .by_id
            .values()
            .filter(|m| !m.is_deleted() && m.created_at > since)
            .filter(|m| match thread_root_id {
                Some(root) => m.thread_root_id == root,
                None => subchannel_id.is_none() || m.subchannel_id == subchannel_id,
            })
            .count();
        Ok(count as u32)
    }

    async fn purge_expired(&self, now: i64, batch: usize) -> RepoResult<usize> {
        let channels = self.channels.read();
        let mut messages = self.messages.write();
        let mut purged = 0usize;

        for (channel_id, store) in messages.iter_mut() {
            let Some(channel) = channels.by_id.get(channel_id) else {
                continue;
            };
            let expired: Vec<u64> = store
                .by_id
                .values()
                .filter(|m| {
                    let retention = m
                        .subchannel_id
                        .and_then(|id| channels.subs_by_id.get(&id))
                        .map(|s| s.retention_hours)
                        .unwrap_or(channel.retention_hours);
                    retention > 0
                        && m.created_at + i64::from(retention) * 3_600_000 < now
                })
                .map(|m| m.id)
                .take(batch - purged)
                .collect();

            for id in expired {
                if let Some(msg) = store.by_id.remove(&id) {
                    if let Some(parent) = msg.parent_id {
                        if let Some(siblings) = store.children.get_mut(&parent) {
                            siblings.retain(|&c| c != id);
                        }
                    }
                    store.children.remove(&id);
                    purged += 1;
                }
            }
            if purged >= batch {
                break;
            }
        }
        Ok(purged)
    }

    async fn set_read_state(&self, state: ReadState) -> RepoResult<()> {
        {
            let users = self.users.read();
            if !users.by_id.contains_key(&state.user_id) {
                return Err(RepoError::UserNotFound);
            }
        }
        self.read_state.write().insert(
            (state.user_id, state.channel_id, state.subchannel_id),
            state.last_read_at,
        );
        Ok(())
    }

    async fn read_states(&self, user_id: u64) -> RepoResult<Vec<ReadState>> {
        Ok(self
            .read_state
            .read()
            .iter()
            .filter(|((uid, _, _), _)| *uid == user_id)
            .map(|(&(user_id, channel_id, subchannel_id), &last_read_at)| ReadState {
                user_id,
                channel_id,
                subchannel_id,
                last_read_at,
            })
            .collect())
    }

    async fn add_ban(&self, new: NewBan) -> RepoResult<Ban> {
        let mut bans = self.bans.write();
        bans.next_id += 1;
        let ban = Ban {
            id: bans.next_id,
            kind: new.kind,
            user_id: new.user_id,
            nickname: new.nickname,
            ip_or_cidr: new.ip_or_cidr,
            reason: new.reason,
            shadow: new.shadow,
            banned_at: new.banned_at,
            banned_until: new.banned_until,
            banned_by: new.banned_by,
        };
        bans.by_id.insert(ban.id, ban.clone());
        Ok(ban)
    }

    async fn remove_ban(&self, ban_id: u64) -> RepoResult<Ban> {
        self.bans
            .write()
            .by_id
            .remove(&ban_id)
            .ok_or(RepoError::BanNotFound)
    }

    async fn list_bans(&self, include_expired: bool, now: i64) -> RepoResult<Vec<Ban>> {
        Ok(self
            .bans
            .read()
            .by_id
            .values()
            .rev()
            .filter(|b| include_expired || !b.is_expired(now))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> i64 {
        1_700_000_000_000
    }

    async fn channel_fixture(repo: &MemoryRepository) -> Channel {
        repo.create_channel("general", "", ChannelType::Chat, 0, false, false, now())
            .await
            .unwrap()
    }

    fn root(channel_id: u64, content: &[u8], at: i64) -> NewMessage {
        NewMessage {
            channel_id,
            subchannel_id: None,
            parent_id: None,
            author_user_id: None,
            author_nickname: Some("anon".into()),
            content: content.to_vec(),
            encrypted: false,
            created_at: at,
        }
    }

    #[tokio::test]
    async fn nickname_uniqueness_is_case_insensitive() {
        let repo = MemoryRepository::new();
        repo.create_user("Alice", None, 0, now()).await.unwrap();
        let err = repo.create_user("alice", None, 0, now()).await.unwrap_err();
        assert!(matches!(err, RepoError::NicknameTaken(_)));
        // Stored case preserved.
        let user = repo.user_by_nickname("ALICE").await.unwrap().unwrap();
        assert_eq!(user.nickname, "Alice");
    }

    #[tokio::test]
    async fn message_ids_are_monotonic_per_channel() {
        let repo = MemoryRepository::new();
        let a = channel_fixture(&repo).await;
        let b = repo
            .create_channel("second", "", ChannelType::Chat, 0, false, false, now())
            .await
            .unwrap();
        let m1 = repo.create_message(root(a.id, b"1", now())).await.unwrap();
        let m2 = repo.create_message(root(a.id, b"2", now())).await.unwrap();
        let m3 = repo.create_message(root(b.id, b"3", now())).await.unwrap();
        assert_eq!((m1.id, m2.id), (1, 2));
        assert_eq!(m3.id, 1);
    }

    #[tokio::test]
    async fn thread_linkage() {
        let repo = MemoryRepository::new();
        let ch = channel_fixture(&repo).await;
        let r = repo.create_message(root(ch.id, b"root", now())).await.unwrap();
        assert_eq!(r.thread_root_id, r.id);
        assert_eq!(r.thread_depth, 0);

        let mut reply = root(ch.id, b"reply", now() + 1);
        reply.parent_id = Some(r.id);
        let c1 = repo.create_message(reply).await.unwrap();
        assert_eq!(c1.thread_root_id, r.id);
        assert_eq!(c1.thread_depth, 1);

        let mut nested = root(ch.id, b"nested", now() + 2);
        nested.parent_id = Some(c1.id);
        let c2 = repo.create_message(nested).await.unwrap();
        assert_eq!(c2.thread_root_id, r.id);
        assert_eq!(c2.thread_depth, 2);
    }

    #[tokio::test]
    async fn subtree_is_depth_first_preorder() {
        let repo = MemoryRepository::new();
        let ch = channel_fixture(&repo).await;
        let r = repo.create_message(root(ch.id, b"r", now())).await.unwrap();
        let mut a = root(ch.id, b"a", now() + 1);
        a.parent_id = Some(r.id);
        let a = repo.create_message(a).await.unwrap();
        let mut b = root(ch.id, b"b", now() + 2);
        b.parent_id = Some(r.id);
        let b = repo.create_message(b).await.unwrap();
        let mut a1 = root(ch.id, b"a1", now() + 3);
        a1.parent_id = Some(a.id);
        let a1 = repo.create_message(a1).await.unwrap();

        let out = repo
            .list_messages(MessageQuery {
                channel_id: ch.id,
                parent_id: Some(r.id),
                limit: 50,
                ..Default::default()
            })
            .await
            .unwrap();
        let ids: Vec<u64> = out.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![r.id, a.id, a1.id, b.id]);
    }

    #[tokio::test]
    async fn before_id_takes_precedence() {
        let repo = MemoryRepository::new();
        let ch = channel_fixture(&repo).await;
        for i in 0..10 {
            repo.create_message(root(ch.id, b"m", now() + i)).await.unwrap();
        }
        let out = repo
            .list_messages(MessageQuery {
                channel_id: ch.id,
                before_id: Some(6),
                after_id: Some(2),
                limit: 3,
                ..Default::default()
            })
            .await
            .unwrap();
        let ids: Vec<u64> = out.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn soft_delete_preserves_structure() {
        let repo = MemoryRepository::new();
        let ch = channel_fixture(&repo).await;
        let r = repo.create_message(root(ch.id, b"r", now())).await.unwrap();
        let mut reply = root(ch.id, b"child", now() + 1);
        reply.parent_id = Some(r.id);
        repo.create_message(reply).await.unwrap();

        let deleted = repo.delete_message(ch.id, r.id, now() + 2).await.unwrap();
        assert!(deleted.is_deleted());
        assert!(deleted.content.is_empty());

        let out = repo
            .list_messages(MessageQuery {
                channel_id: ch.id,
                parent_id: Some(r.id),
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn delete_user_nulls_authorship_and_cascades() {
        let repo = MemoryRepository::new();
        let ch = channel_fixture(&repo).await;
        let user = repo.create_user("bob", None, 0, now()).await.unwrap();
        repo.add_ssh_key(user.id, "SHA256:fp", "ssh-ed25519", "laptop", now())
            .await
            .unwrap();
        let mut msg = root(ch.id, b"hi", now());
        msg.author_user_id = Some(user.id);
        msg.author_nickname = None;
        let msg = repo.create_message(msg).await.unwrap();

        repo.delete_user(user.id).await.unwrap();

        let stored = repo.message_by_id(ch.id, msg.id).await.unwrap().unwrap();
        assert_eq!(stored.author_user_id, None);
        assert_eq!(stored.author_nickname.as_deref(), Some("bob"));
        assert!(repo.ssh_key_by_fingerprint("SHA256:fp").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn retention_purges_expired_messages() {
        let repo = MemoryRepository::new();
        let ch = repo
            .create_channel("ephemeral", "", ChannelType::Chat, 1, false, false, now())
            .await
            .unwrap();
        let old = now() - 2 * 3_600_000;
        repo.create_message(root(ch.id, b"old", old)).await.unwrap();
        repo.create_message(root(ch.id, b"new", now())).await.unwrap();

        let purged = repo.purge_expired(now(), 100).await.unwrap();
        assert_eq!(purged, 1);
        let left = repo
            .list_messages(MessageQuery {
                channel_id: ch.id,
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].content, b"new");
    }

    #[tokio::test]
    async fn unread_counts_respect_scope() {
        let repo = MemoryRepository::new();
        let ch = channel_fixture(&repo).await;
        let r = repo.create_message(root(ch.id, b"r", now())).await.unwrap();
        let mut reply = root(ch.id, b"c", now() + 10);
        reply.parent_id = Some(r.id);
        repo.create_message(reply).await.unwrap();

        assert_eq!(
            repo.count_messages_since(ch.id, None, None, now() - 1).await.unwrap(),
            2
        );
        assert_eq!(
            repo.count_messages_since(ch.id, None, Some(r.id), now() + 5)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn expired_bans_filtered_unless_requested() {
        let repo = MemoryRepository::new();
        let expired = NewBan {
            kind: BanKind::User,
            user_id: Some(1),
            nickname: Some("x".into()),
            ip_or_cidr: None,
            reason: "old".into(),
            shadow: false,
            banned_at: now() - 1000,
            banned_until: Some(now() - 1),
            banned_by: "admin".into(),
        };
        repo.add_ban(expired).await.unwrap();
        assert!(repo.list_bans(false, now()).await.unwrap().is_empty());
        assert_eq!(repo.list_bans(true, now()).await.unwrap().len(), 1);
    }
}
