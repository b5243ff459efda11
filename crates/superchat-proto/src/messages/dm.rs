//! Direct-message negotiation payloads.
//!
//! The server orchestrates key exchange but never interprets key material:
//! public keys are opaque 32-byte values relayed between peers.

use bytes::{BufMut, Bytes, BytesMut};

use super::{DmTarget, Wire};
use crate::error::WireError;
use crate::wire::*;

/// How the client obtained the key it is providing.
pub mod key_type {
    /// Freshly generated X25519 keypair.
    pub const GENERATED: u8 = 0;
    /// Deterministically derived by the client (e.g. from a seed phrase).
    pub const DERIVED: u8 = 1;
}

/// START_DM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartDm {
    /// Who to open the DM with.
    pub target: DmTarget,
    /// Whether the initiator accepts an unencrypted DM for this invite.
    pub allow_unencrypted: bool,
}

impl Wire for StartDm {
    fn encode(&self, buf: &mut BytesMut) {
        self.target.encode(buf);
        put_bool(buf, self.allow_unencrypted);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            target: DmTarget::decode(buf)?,
            allow_unencrypted: get_bool(buf)?,
        })
    }
}

/// DM_PENDING: the invite is waiting on the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmPending {
    /// Invite id.
    pub invite_id: u64,
    /// Display name of the target.
    pub target_nickname: String,
}

impl Wire for DmPending {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.invite_id);
        put_string(buf, &self.target_nickname);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            invite_id: get_u64(buf)?,
            target_nickname: get_string(buf)?,
        })
    }
}

/// DM_REQUEST: delivered to the target of an invite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmRequest {
    /// Invite id.
    pub invite_id: u64,
    /// Display name of the initiator.
    pub from_nickname: String,
    /// Whether the initiator would accept an unencrypted DM.
    pub allow_unencrypted: bool,
}

impl Wire for DmRequest {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.invite_id);
        put_string(buf, &self.from_nickname);
        put_bool(buf, self.allow_unencrypted);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            invite_id: get_u64(buf)?,
            from_nickname: get_string(buf)?,
            allow_unencrypted: get_bool(buf)?,
        })
    }
}

/// KEY_REQUIRED: the server needs a public key from this side to proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyRequired {
    /// Invite id the key is needed for.
    pub invite_id: u64,
}

impl Wire for KeyRequired {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.invite_id);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            invite_id: get_u64(buf)?,
        })
    }
}

/// PROVIDE_PUBLIC_KEY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvidePublicKey {
    /// Invite being answered; absent to set the key proactively.
    pub invite_id: Option<u64>,
    /// [`key_type::GENERATED`] or [`key_type::DERIVED`].
    pub key_type: u8,
    /// X25519 public key.
    pub public_key: [u8; 32],
}

impl Wire for ProvidePublicKey {
    fn encode(&self, buf: &mut BytesMut) {
        put_opt_u64(buf, self.invite_id);
        buf.put_u8(self.key_type);
        buf.put_slice(&self.public_key);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            invite_id: get_opt_u64(buf)?,
            key_type: get_u8(buf)?,
            public_key: get_key32(buf)?,
        })
    }
}

/// ALLOW_UNENCRYPTED. `permanent` records the preference on the user row;
/// otherwise it applies only to the named invite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowUnencrypted {
    /// Invite being answered; absent with `permanent` to set the default.
    pub invite_id: Option<u64>,
    /// Whether to persist the preference.
    pub permanent: bool,
}

impl Wire for AllowUnencrypted {
    fn encode(&self, buf: &mut BytesMut) {
        put_opt_u64(buf, self.invite_id);
        put_bool(buf, self.permanent);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            invite_id: get_opt_u64(buf)?,
            permanent: get_bool(buf)?,
        })
    }
}

/// DM_READY: the DM channel is usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmReady {
    /// Invite that completed.
    pub invite_id: u64,
    /// The allocated DM channel.
    pub channel_id: u64,
    /// Display name of the peer.
    pub peer_nickname: String,
    /// Peer's X25519 public key; absent for unencrypted DMs.
    pub peer_public_key: Option<[u8; 32]>,
}

impl Wire for DmReady {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.invite_id);
        buf.put_u64(self.channel_id);
        put_string(buf, &self.peer_nickname);
        put_opt_key32(buf, &self.peer_public_key);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            invite_id: get_u64(buf)?,
            channel_id: get_u64(buf)?,
            peer_nickname: get_string(buf)?,
            peer_public_key: get_opt_key32(buf)?,
        })
    }
}

/// DM_PARTICIPANT_LEFT: the peer disconnected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmParticipantLeft {
    /// The DM channel affected.
    pub channel_id: u64,
    /// Display name of the departed peer.
    pub nickname: String,
}

impl Wire for DmParticipantLeft {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.channel_id);
        put_string(buf, &self.nickname);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            channel_id: get_u64(buf)?,
            nickname: get_string(buf)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::{round_trip, Message};
    use super::*;

    #[test]
    fn dm_round_trips() {
        round_trip(Message::StartDm(StartDm {
            target: DmTarget::Nickname("bob".into()),
            allow_unencrypted: false,
        }));
        round_trip(Message::DmPending(DmPending {
            invite_id: 1,
            target_nickname: "bob".into(),
        }));
        round_trip(Message::DmRequest(DmRequest {
            invite_id: 1,
            from_nickname: "~alice".into(),
            allow_unencrypted: false,
        }));
        round_trip(Message::KeyRequired(KeyRequired { invite_id: 1 }));
        round_trip(Message::ProvidePublicKey(ProvidePublicKey {
            invite_id: Some(1),
            key_type: key_type::GENERATED,
            public_key: [9u8; 32],
        }));
        round_trip(Message::AllowUnencrypted(AllowUnencrypted {
            invite_id: None,
            permanent: true,
        }));
        round_trip(Message::DmReady(DmReady {
            invite_id: 1,
            channel_id: 77,
            peer_nickname: "bob".into(),
            peer_public_key: Some([9u8; 32]),
        }));
        round_trip(Message::DmReady(DmReady {
            invite_id: 1,
            channel_id: 77,
            peer_nickname: "bob".into(),
            peer_public_key: None,
        }));
        round_trip(Message::DmParticipantLeft(DmParticipantLeft {
            channel_id: 77,
            nickname: "bob".into(),
        }));
    }
}
