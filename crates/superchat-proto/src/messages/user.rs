//! User lookup and SSH key management payloads.

use bytes::{BufMut, Bytes, BytesMut};

use super::{SshKeyInfo, UserEntry, Wire};
use crate::error::WireError;
use crate::wire::*;

/// GET_USER_INFO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetUserInfo {
    /// Nickname to look up (without the `~` anonymous sigil).
    pub nickname: String,
}

impl Wire for GetUserInfo {
    fn encode(&self, buf: &mut BytesMut) {
        put_string(buf, &self.nickname);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            nickname: get_string(buf)?,
        })
    }
}

/// USER_INFO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    /// Whether a registered user with that nickname exists.
    pub found: bool,
    /// The user row, when found.
    pub user: Option<UserEntry>,
    /// Whether the nickname is currently held by an anonymous session.
    pub anonymous_online: bool,
}

impl Wire for UserInfo {
    fn encode(&self, buf: &mut BytesMut) {
        put_bool(buf, self.found);
        put_opt(buf, &self.user, |b, u| u.encode(b));
        put_bool(buf, self.anonymous_online);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            found: get_bool(buf)?,
            user: get_opt(buf, UserEntry::decode)?,
            anonymous_online: get_bool(buf)?,
        })
    }
}

/// LIST_USERS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListUsers;

impl Wire for ListUsers {
    fn encode(&self, _buf: &mut BytesMut) {}

    fn decode(_buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self)
    }
}

/// USER_LIST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserList {
    /// Registered users.
    pub users: Vec<UserEntry>,
}

impl Wire for UserList {
    fn encode(&self, buf: &mut BytesMut) {
        put_list(buf, &self.users, |b, u| u.encode(b));
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            users: get_list(buf, UserEntry::decode)?,
        })
    }
}

/// DELETE_USER (admin): delete a user and cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteUser {
    /// User to delete.
    pub user_id: u64,
}

impl Wire for DeleteUser {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.user_id);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            user_id: get_u64(buf)?,
        })
    }
}

/// USER_DELETED: broadcast to every session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDeleted {
    /// The deleted user id.
    pub user_id: u64,
    /// Their last nickname.
    pub nickname: String,
}

impl Wire for UserDeleted {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.user_id);
        put_string(buf, &self.nickname);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            user_id: get_u64(buf)?,
            nickname: get_string(buf)?,
        })
    }
}

/// ADD_SSH_KEY: attach a public key in OpenSSH `authorized_keys` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddSshKey {
    /// The public key line (`ssh-ed25519 AAAA... comment`).
    pub public_key: String,
    /// User-chosen label.
    pub label: String,
}

impl Wire for AddSshKey {
    fn encode(&self, buf: &mut BytesMut) {
        put_string(buf, &self.public_key);
        put_string(buf, &self.label);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            public_key: get_string(buf)?,
            label: get_string(buf)?,
        })
    }
}

/// SSH_KEY_ADDED.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshKeyAdded {
    /// Whether the key was stored.
    pub success: bool,
    /// New key id on success.
    pub key_id: Option<u64>,
    /// Computed SHA-256 fingerprint on success.
    pub fingerprint: Option<String>,
    /// Failure detail.
    pub message: Option<String>,
}

impl Wire for SshKeyAdded {
    fn encode(&self, buf: &mut BytesMut) {
        put_bool(buf, self.success);
        put_opt_u64(buf, self.key_id);
        put_opt_string(buf, &self.fingerprint);
        put_opt_string(buf, &self.message);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            success: get_bool(buf)?,
            key_id: get_opt_u64(buf)?,
            fingerprint: get_opt_string(buf)?,
            message: get_opt_string(buf)?,
        })
    }
}

/// UPDATE_SSH_KEY_LABEL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateSshKeyLabel {
    /// Key to relabel.
    pub key_id: u64,
    /// New label.
    pub label: String,
}

impl Wire for UpdateSshKeyLabel {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.key_id);
        put_string(buf, &self.label);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            key_id: get_u64(buf)?,
            label: get_string(buf)?,
        })
    }
}

/// SSH_KEY_LABEL_UPDATED.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshKeyLabelUpdated {
    /// Whether the label was updated.
    pub success: bool,
    /// Failure detail.
    pub message: Option<String>,
}

impl Wire for SshKeyLabelUpdated {
    fn encode(&self, buf: &mut BytesMut) {
        put_bool(buf, self.success);
        put_opt_string(buf, &self.message);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            success: get_bool(buf)?,
            message: get_opt_string(buf)?,
        })
    }
}

/// DELETE_SSH_KEY. Refused if it would leave a password-less user with
/// zero keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteSshKey {
    /// Key to remove.
    pub key_id: u64,
}

impl Wire for DeleteSshKey {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.key_id);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            key_id: get_u64(buf)?,
        })
    }
}

/// SSH_KEY_DELETED.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshKeyDeleted {
    /// Whether the key was removed.
    pub success: bool,
    /// Failure detail.
    pub message: Option<String>,
}

impl Wire for SshKeyDeleted {
    fn encode(&self, buf: &mut BytesMut) {
        put_bool(buf, self.success);
        put_opt_string(buf, &self.message);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            success: get_bool(buf)?,
            message: get_opt_string(buf)?,
        })
    }
}

/// LIST_SSH_KEYS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListSshKeys;

impl Wire for ListSshKeys {
    fn encode(&self, _buf: &mut BytesMut) {}

    fn decode(_buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self)
    }
}

/// SSH_KEY_LIST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshKeyList {
    /// The authenticated user's keys.
    pub keys: Vec<SshKeyInfo>,
}

impl Wire for SshKeyList {
    fn encode(&self, buf: &mut BytesMut) {
        put_list(buf, &self.keys, |b, k| k.encode(b));
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            keys: get_list(buf, SshKeyInfo::decode)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::{round_trip, Message};
    use super::*;

    #[test]
    fn user_round_trips() {
        round_trip(Message::GetUserInfo(GetUserInfo {
            nickname: "bob".into(),
        }));
        round_trip(Message::UserInfo(UserInfo {
            found: true,
            user: Some(UserEntry {
                user_id: 42,
                nickname: "bob".into(),
                is_admin: true,
                online: false,
                created_at: 1_700_000_000_000,
            }),
            anonymous_online: false,
        }));
        round_trip(Message::ListUsers(ListUsers));
        round_trip(Message::UserList(UserList { users: vec![] }));
        round_trip(Message::DeleteUser(DeleteUser { user_id: 42 }));
        round_trip(Message::UserDeleted(UserDeleted {
            user_id: 42,
            nickname: "bob".into(),
        }));
    }

    #[test]
    fn ssh_key_round_trips() {
        round_trip(Message::AddSshKey(AddSshKey {
            public_key: "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIGhx laptop".into(),
            label: "laptop".into(),
        }));
        round_trip(Message::SshKeyAdded(SshKeyAdded {
            success: true,
            key_id: Some(1),
            fingerprint: Some("SHA256:abcdef".into()),
            message: None,
        }));
        round_trip(Message::UpdateSshKeyLabel(UpdateSshKeyLabel {
            key_id: 1,
            label: "new label".into(),
        }));
        round_trip(Message::SshKeyLabelUpdated(SshKeyLabelUpdated {
            success: true,
            message: None,
        }));
        round_trip(Message::DeleteSshKey(DeleteSshKey { key_id: 1 }));
        round_trip(Message::SshKeyDeleted(SshKeyDeleted {
            success: false,
            message: Some("Cannot remove the last key of a password-less user".into()),
        }));
        round_trip(Message::ListSshKeys(ListSshKeys));
        round_trip(Message::SshKeyList(SshKeyList {
            keys: vec![SshKeyInfo {
                id: 1,
                fingerprint: "SHA256:abcdef".into(),
                key_type: "ssh-ed25519".into(),
                label: "laptop".into(),
                added_at: 1_700_000_000_000,
                last_used_at: Some(1_700_000_000_500),
            }],
        }));
    }
}
