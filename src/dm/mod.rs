//! DM orchestrator - key-required negotiation and invite state.
//!
//! A [`DmInvite`] coordinates the exchange before a DM channel becomes
//! usable. Transitions are monotonic: an invite moves toward ready or is
//! abandoned on disconnect. Public keys are opaque 32-byte values; for
//! registered users they persist on the user row, for anonymous sessions
//! they live here and die with the session.
//!
//! The catalog has no explicit decline message, so "declined" can only be
//! realized as target disconnect (abandonment); see DESIGN.md.

use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

use superchat_proto::messages::{
    DmParticipantLeft, DmPending, DmReady, DmRequest, KeyRequired, Message,
};

use crate::error::{HandlerError, HandlerResult};
use crate::hub::{now_ms, Hub};
use crate::repo::ChannelType;

/// One side of an invite.
#[derive(Debug, Clone)]
pub struct Party {
    pub session_id: u64,
    pub user_id: Option<u64>,
    pub nickname: String,
}

/// Invite lifecycle. Transitions are monotonic toward `Ready`; an invite
/// that cannot advance is abandoned on disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteStatus {
    /// Created, not yet evaluated.
    New,
    AwaitingInitiatorKey,
    AwaitingTarget,
    Ready,
}

/// Pending DM negotiation state.
#[derive(Debug, Clone)]
pub struct DmInvite {
    pub id: u64,
    pub initiator: Party,
    pub target_user: Option<u64>,
    /// Live sessions on the target side at invite time.
    pub target_sessions: Vec<u64>,
    pub target_nickname: String,
    /// Invite-scoped unencrypted consent, per side.
    pub initiator_allows_unencrypted: bool,
    pub target_allows_unencrypted: bool,
    pub status: InviteStatus,
    pub dm_channel_id: Option<u64>,
}

impl DmInvite {
    fn involves_session(&self, session_id: u64) -> bool {
        self.initiator.session_id == session_id || self.target_sessions.contains(&session_id)
    }

    fn is_target_session(&self, session_id: u64) -> bool {
        self.target_sessions.contains(&session_id)
    }
}

/// Invite table plus session-scoped key state.
#[derive(Default)]
pub struct DmOrchestrator {
    invites: DashMap<u64, DmInvite>,
    next_invite_id: AtomicU64,
    /// Anonymous sessions' public keys; destroyed on disconnect.
    session_keys: DashMap<u64, [u8; 32]>,
    /// Anonymous sessions that permanently accept unencrypted DMs.
    session_allow_unencrypted: DashSet<u64>,
}

impl DmOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> u64 {
        self.next_invite_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Key on file for a party: user row first, session store otherwise.
    async fn key_for(&self, hub: &Hub, party: &Party) -> Result<Option<[u8; 32]>, HandlerError> {
        if let Some(user_id) = party.user_id {
            let user = hub
                .repo
                .user_by_id(user_id)
                .await?
                .ok_or_else(|| HandlerError::UserNotFound(party.nickname.clone()))?;
            return Ok(user.encryption_public_key);
        }
        Ok(self.session_keys.get(&party.session_id).map(|k| *k))
    }

    /// Standing unencrypted consent for a party (user row or session flag).
    async fn standing_allow(&self, hub: &Hub, party: &Party) -> Result<bool, HandlerError> {
        if let Some(user_id) = party.user_id {
            let user = hub
                .repo
                .user_by_id(user_id)
                .await?
                .ok_or_else(|| HandlerError::UserNotFound(party.nickname.clone()))?;
            return Ok(user.allow_unencrypted_dms);
        }
        Ok(self.session_allow_unencrypted.contains(&party.session_id))
    }

    /// START_DM entry point.
    pub async fn start_dm(
        &self,
        hub: &Hub,
        initiator: Party,
        target: superchat_proto::messages::DmTarget,
        allow_unencrypted: bool,
    ) -> HandlerResult {
        use superchat_proto::messages::DmTarget;

        let (target_user, target_sessions, target_nickname) = match target {
            DmTarget::UserId(user_id) => {
                let user = hub
                    .repo
                    .user_by_id(user_id)
                    .await?
                    .ok_or_else(|| HandlerError::TargetNotFound(format!("user {user_id}")))?;
                let sessions: Vec<u64> = hub
                    .broker
                    .sessions_of_user(user_id)
                    .iter()
                    .map(|h| h.id)
                    .collect();
                (Some(user.id), sessions, user.nickname)
            }
            DmTarget::Nickname(nick) => {
                // Registered holders win over anonymous sessions; anonymous
                // display names carry the `~` sigil, so try both forms.
                if let Some(user) = hub.repo.user_by_nickname(&nick).await? {
                    let sessions: Vec<u64> = hub
                        .broker
                        .sessions_of_user(user.id)
                        .iter()
                        .map(|h| h.id)
                        .collect();
                    (Some(user.id), sessions, user.nickname)
                } else {
                    let mut sessions = hub.broker.sessions_with_nickname(&nick);
                    if sessions.is_empty() && !nick.starts_with('~') {
                        sessions = hub.broker.sessions_with_nickname(&format!("~{nick}"));
                    }
                    if sessions.is_empty() {
                        return Err(HandlerError::TargetNotFound(nick));
                    }
                    let display = sessions[0]
                        .shared
                        .nickname()
                        .unwrap_or_else(|| nick.clone());
                    (None, sessions.iter().map(|h| h.id).collect(), display)
                }
            }
            DmTarget::SessionId(session_id) => {
                let handle = hub
                    .broker
                    .session(session_id)
                    .ok_or_else(|| HandlerError::TargetNotFound(format!("session {session_id}")))?;
                let nickname = handle
                    .shared
                    .nickname()
                    .unwrap_or_else(|| format!("session {session_id}"));
                (handle.shared.user_id(), vec![session_id], nickname)
            }
        };

        let self_dm = target_sessions.contains(&initiator.session_id)
            || (target_user.is_some() && target_user == initiator.user_id);
        if self_dm {
            return Err(HandlerError::Validation("cannot open a DM with yourself".into()));
        }

        let mut invite = DmInvite {
            id: self.next_id(),
            initiator,
            target_user,
            target_sessions,
            target_nickname,
            initiator_allows_unencrypted: allow_unencrypted,
            target_allows_unencrypted: false,
            status: InviteStatus::New,
            dm_channel_id: None,
        };
        info!(invite = invite.id, target = %invite.target_nickname, "DM invite opened");

        // Store before notifying: a fast peer may answer the moment the
        // DM_REQUEST lands.
        self.invites.insert(invite.id, invite.clone());
        match self.evaluate(hub, &mut invite).await {
            Ok(()) => {
                if invite.status != InviteStatus::Ready {
                    self.invites.insert(invite.id, invite);
                }
                Ok(())
            }
            Err(e) => {
                self.invites.remove(&invite.id);
                Err(e)
            }
        }
    }

    /// Re-derive the invite state from both sides' keys and consents,
    /// emitting whatever notifications the transition requires.
    /// Notifications fire only when the status actually changes, so
    /// repeated evaluation never duplicates DM_REQUEST or KEY_REQUIRED.
    async fn evaluate(&self, hub: &Hub, invite: &mut DmInvite) -> HandlerResult {
        let previous = invite.status;
        let initiator_key = self.key_for(hub, &invite.initiator).await?;
        let initiator_allows = invite.initiator_allows_unencrypted
            || self.standing_allow(hub, &invite.initiator).await?;

        let target_party = Party {
            session_id: *invite.target_sessions.first().unwrap_or(&0),
            user_id: invite.target_user,
            nickname: invite.target_nickname.clone(),
        };
        let target_key = self.key_for(hub, &target_party).await.unwrap_or(None);
        let target_allows = invite.target_allows_unencrypted
            || self.standing_allow(hub, &target_party).await.unwrap_or(false);

        if initiator_key.is_none() && !initiator_allows {
            invite.status = InviteStatus::AwaitingInitiatorKey;
            if previous != InviteStatus::AwaitingInitiatorKey {
                hub.broker.send_message_to(
                    invite.initiator.session_id,
                    &Message::KeyRequired(KeyRequired { invite_id: invite.id }),
                );
            }
            return Ok(());
        }

        let encrypted_possible = initiator_key.is_some() && target_key.is_some();
        let unencrypted_agreed = initiator_allows && target_allows;

        if encrypted_possible || unencrypted_agreed {
            let (a_key, b_key) = if encrypted_possible {
                (initiator_key, target_key)
            } else {
                (None, None)
            };
            self.make_ready(hub, invite, a_key, b_key).await?;
            return Ok(());
        }

        // Target must act: provide a key or accept unencrypted.
        invite.status = InviteStatus::AwaitingTarget;
        if invite.target_sessions.is_empty() {
            return Err(HandlerError::TargetNotFound(invite.target_nickname.clone()));
        }
        if previous == InviteStatus::AwaitingTarget {
            return Ok(());
        }
        let request = Message::DmRequest(DmRequest {
            invite_id: invite.id,
            from_nickname: invite.initiator.nickname.clone(),
            allow_unencrypted: initiator_allows,
        });
        let key_required = Message::KeyRequired(KeyRequired { invite_id: invite.id });
        for &session_id in &invite.target_sessions {
            hub.broker.send_message_to(session_id, &request);
            hub.broker.send_message_to(session_id, &key_required);
        }
        hub.broker.send_message_to(
            invite.initiator.session_id,
            &Message::DmPending(DmPending {
                invite_id: invite.id,
                target_nickname: invite.target_nickname.clone(),
            }),
        );
        Ok(())
    }

    /// Allocate the DM channel and notify both sides.
    async fn make_ready(
        &self,
        hub: &Hub,
        invite: &mut DmInvite,
        initiator_key: Option<[u8; 32]>,
        target_key: Option<[u8; 32]>,
    ) -> HandlerResult {
        let name = format!("dm-{}", invite.id);
        let channel = hub
            .repo
            .create_channel(&name, "", ChannelType::Chat, 0, true, true, now_ms())
            .await?;

        invite.status = InviteStatus::Ready;
        invite.dm_channel_id = Some(channel.id);

        // Wire both sides into the broker so the ordinary fan-out path
        // covers DM traffic.
        hub.broker.subscribe_channel(channel.id, invite.initiator.session_id);
        hub.broker.join_roster(channel.id, invite.initiator.session_id);
        for &session_id in &invite.target_sessions {
            hub.broker.subscribe_channel(channel.id, session_id);
            hub.broker.join_roster(channel.id, session_id);
        }

        hub.broker.send_message_to(
            invite.initiator.session_id,
            &Message::DmReady(DmReady {
                invite_id: invite.id,
                channel_id: channel.id,
                peer_nickname: invite.target_nickname.clone(),
                peer_public_key: target_key,
            }),
        );
        let to_target = Message::DmReady(DmReady {
            invite_id: invite.id,
            channel_id: channel.id,
            peer_nickname: invite.initiator.nickname.clone(),
            peer_public_key: initiator_key,
        });
        for &session_id in &invite.target_sessions {
            hub.broker.send_message_to(session_id, &to_target);
        }

        info!(
            invite = invite.id,
            channel = channel.id,
            encrypted = target_key.is_some(),
            "DM ready"
        );
        self.invites.insert(invite.id, invite.clone());
        Ok(())
    }

    /// PROVIDE_PUBLIC_KEY: store the key, then advance any invite waiting
    /// on this party.
    pub async fn provide_public_key(
        &self,
        hub: &Hub,
        party: Party,
        invite_id: Option<u64>,
        key: [u8; 32],
    ) -> HandlerResult {
        if let Some(user_id) = party.user_id {
            hub.repo.set_encryption_key(user_id, Some(key)).await?;
        } else {
            self.session_keys.insert(party.session_id, key);
        }
        debug!(session = party.session_id, "DM public key stored");
        self.reevaluate_for(hub, &party, invite_id).await
    }

    /// ALLOW_UNENCRYPTED: record consent, then advance.
    pub async fn allow_unencrypted(
        &self,
        hub: &Hub,
        party: Party,
        invite_id: Option<u64>,
        permanent: bool,
    ) -> HandlerResult {
        if permanent {
            if let Some(user_id) = party.user_id {
                hub.repo.set_allow_unencrypted(user_id, true).await?;
            } else {
                self.session_allow_unencrypted.insert(party.session_id);
            }
        }
        if let Some(id) = invite_id {
            if let Some(mut invite) = self.invites.get_mut(&id) {
                if invite.initiator.session_id == party.session_id {
                    invite.initiator_allows_unencrypted = true;
                } else if invite.is_target_session(party.session_id)
                    || (party.user_id.is_some() && invite.target_user == party.user_id)
                {
                    invite.target_allows_unencrypted = true;
                }
            }
        }
        self.reevaluate_for(hub, &party, invite_id).await
    }

    async fn reevaluate_for(
        &self,
        hub: &Hub,
        party: &Party,
        invite_id: Option<u64>,
    ) -> HandlerResult {
        let candidates: Vec<u64> = self
            .invites
            .iter()
            .filter(|entry| {
                if let Some(id) = invite_id {
                    return entry.id == id;
                }
                entry.involves_session(party.session_id)
                    || (party.user_id.is_some() && entry.target_user == party.user_id)
            })
            .filter(|entry| entry.status != InviteStatus::Ready)
            .map(|entry| entry.id)
            .collect();

        for id in candidates {
            let Some(mut invite) = self.invites.get(&id).map(|e| e.clone()) else {
                continue;
            };
            self.evaluate(hub, &mut invite).await?;
            if invite.status == InviteStatus::Ready {
                // make_ready already stored the updated invite.
                continue;
            }
            self.invites.insert(id, invite);
        }
        Ok(())
    }

    /// Session teardown: abandon pending invites, notify ready peers,
    /// drop session-scoped key material.
    pub fn session_closed(&self, hub: &Hub, session_id: u64, nickname: Option<&str>) {
        self.session_keys.remove(&session_id);
        self.session_allow_unencrypted.remove(&session_id);

        let involved: Vec<u64> = self
            .invites
            .iter()
            .filter(|entry| entry.involves_session(session_id))
            .map(|entry| entry.id)
            .collect();

        for id in involved {
            let Some((_, mut invite)) = self.invites.remove(&id) else {
                continue;
            };

            let display = nickname.unwrap_or("peer").to_string();
            match invite.status {
                InviteStatus::Ready => {
                    // Channel exists: tell the surviving side.
                    let channel_id = invite.dm_channel_id.unwrap_or_default();
                    let left = Message::DmParticipantLeft(DmParticipantLeft {
                        channel_id,
                        nickname: display,
                    });
                    if invite.initiator.session_id == session_id {
                        for &sid in &invite.target_sessions {
                            hub.broker.send_message_to(sid, &left);
                        }
                    } else {
                        invite.target_sessions.retain(|&sid| sid != session_id);
                        if invite.target_sessions.is_empty() {
                            hub.broker.send_message_to(invite.initiator.session_id, &left);
                        } else {
                            // Other target sessions remain; keep the invite.
                            self.invites.insert(id, invite);
                        }
                    }
                }
                _ => {
                    // Not ready yet: silent cleanup, per the invite contract.
                    if invite.is_target_session(session_id) {
                        invite.target_sessions.retain(|&sid| sid != session_id);
                        if !invite.target_sessions.is_empty() || invite.target_user.is_some() {
                            self.invites.insert(id, invite);
                            continue;
                        }
                    }
                    debug!(invite = id, "DM invite abandoned on disconnect");
                }
            }
        }
    }

    /// Look up an invite (used by tests and handlers).
    pub fn invite(&self, id: u64) -> Option<DmInvite> {
        self.invites.get(&id).map(|e| e.clone())
    }
}
