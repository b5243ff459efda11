//! Session - one connection's lifecycle.
//!
//! A connection runs the accept sequence (IP ban gate, SSH identity
//! synthesis, SERVER_CONFIG), then a unified event loop multiplexing the
//! framed reader, the bounded outbound queue, the idle timer, the
//! session's cancellation token, and process shutdown. Teardown removes
//! the session from every broker structure, abandons its DM invites, and
//! emits offline presence.

mod dispatch;
mod state;

pub use dispatch::{dispatch, Context, DispatchOutcome};
pub use state::{AuthedUser, Session, MAX_AUTH_FAILURES};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use superchat_proto::messages::{AuthResponse, Message, ServerDisconnect, ServerPresence};
use superchat_proto::{ErrorCode, FrameError};
use tracing::{debug, info, instrument, warn};

use crate::broker::{SessionHandle, SessionShared};
use crate::hub::{now_ms, Hub};
use crate::network::{FramedTransport, SshIdentity};
use crate::repo::{RepoError, User};

const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// A client connection handler.
pub struct Connection {
    session_id: u64,
    transport: FramedTransport,
    addr: SocketAddr,
    hub: Arc<Hub>,
    ssh_identity: Option<SshIdentity>,
}

enum SshResolution {
    Authenticated(Box<User>),
    Banned(String),
    Rejected(String),
}

impl Connection {
    pub fn new(
        session_id: u64,
        transport: FramedTransport,
        addr: SocketAddr,
        hub: Arc<Hub>,
        ssh_identity: Option<SshIdentity>,
    ) -> Self {
        Self {
            session_id,
            transport,
            addr,
            hub,
            ssh_identity,
        }
    }

    /// Run the connection to completion.
    #[instrument(skip(self), fields(session = self.session_id, addr = %self.addr), name = "session")]
    pub async fn run(mut self) -> anyhow::Result<()> {
        let now = now_ms();
        let hub = Arc::clone(&self.hub);

        // Gate 1: IP bans refuse the connection before SERVER_CONFIG.
        if let Some(verdict) = hub.bans.check_ip(self.addr.ip(), now) {
            info!(reason = %verdict.reason, "Connection refused: banned IP");
            let goodbye = Message::ServerDisconnect(ServerDisconnect {
                reason: "banned".into(),
            });
            let _ = self.transport.send_frame(goodbye.to_frame()).await;
            return Ok(());
        }

        let shared = Arc::new(SessionShared::new(self.addr.ip(), now));
        let (handle, mut outbound_rx) = SessionHandle::new(self.session_id, shared);
        let mut session = Session::new(self.session_id, self.addr.ip(), handle.clone());

        // SSH connections arrive with a verified key; synthesize identity
        // and answer AUTH_RESPONSE before SERVER_CONFIG.
        if let Some(identity) = self.ssh_identity.clone() {
            match resolve_ssh_identity(&hub, &identity, now).await {
                Ok(SshResolution::Authenticated(user)) => {
                    let is_admin = admin_status(&hub, &user);
                    session.nickname = Some(user.nickname.clone());
                    session.user = Some(AuthedUser {
                        id: user.id,
                        nickname: user.nickname.clone(),
                        is_admin,
                    });
                    session.sync_shared();
                    let response = Message::AuthResponse(AuthResponse {
                        success: true,
                        user_id: Some(user.id),
                        nickname: Some(user.nickname.clone()),
                        is_admin,
                        message: None,
                    });
                    self.transport.send_frame(response.to_frame()).await?;
                    info!(user = %user.nickname, "SSH identity attached");
                }
                Ok(SshResolution::Banned(reason)) => {
                    let response = Message::AuthResponse(AuthResponse {
                        success: false,
                        user_id: None,
                        nickname: None,
                        is_admin: false,
                        message: Some(reason),
                    });
                    self.transport.send_frame(response.to_frame()).await?;
                }
                Ok(SshResolution::Rejected(reason)) => {
                    warn!(reason = %reason, "SSH connection rejected");
                    let goodbye =
                        Message::ServerDisconnect(ServerDisconnect { reason });
                    let _ = self.transport.send_frame(goodbye.to_frame()).await;
                    return Ok(());
                }
                Err(e) => {
                    warn!(error = %e, "SSH identity resolution failed");
                    return Ok(());
                }
            }
        }

        // SERVER_CONFIG is the first frame every accepted session sees
        // (after the SSH AUTH_RESPONSE, when applicable).
        self.transport
            .send_frame(Message::ServerConfig(hub.server_config()).to_frame())
            .await?;

        hub.broker.register(handle.clone());
        if let Some(name) = session.display_name() {
            session.announced_online = true;
            hub.broker.broadcast_all(&Message::ServerPresence(ServerPresence {
                nickname: name,
                online: true,
            }));
        }

        let close_reason = self.event_loop(&hub, &mut session, &handle, &mut outbound_rx).await;

        // Flush whatever the broker already queued, then say goodbye.
        while let Ok(frame) = outbound_rx.try_recv() {
            if self.transport.send_frame(frame).await.is_err() {
                break;
            }
        }
        if let Some(reason) = close_reason {
            let goodbye = Message::ServerDisconnect(ServerDisconnect { reason });
            let _ = self.transport.send_frame(goodbye.to_frame()).await;
        }

        self.teardown(&mut session);
        Ok(())
    }

    async fn event_loop(
        &mut self,
        hub: &Arc<Hub>,
        session: &mut Session,
        handle: &SessionHandle,
        outbound_rx: &mut tokio::sync::mpsc::Receiver<superchat_proto::Frame>,
    ) -> Option<String> {
        let idle_timeout = Duration::from_secs(hub.config.timeouts.idle_timeout_secs);
        let mut idle_timer = tokio::time::interval(IDLE_CHECK_INTERVAL);
        idle_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        idle_timer.tick().await;

        let mut shutdown_rx = hub.shutdown_tx.subscribe();
        let cancel = handle.cancelled();

        loop {
            tokio::select! {
                read = self.transport.next_frame() => match read {
                    Some(Ok(frame)) => {
                        // Handlers race the cancel token so a kicked
                        // session cannot stall in a long handler.
                        let outcome = tokio::select! {
                            outcome = dispatch(hub, session, frame) => outcome,
                            _ = cancel.cancelled() => {
                                DispatchOutcome::Close(handle.take_close_reason())
                            }
                        };
                        match outcome {
                            DispatchOutcome::Continue => {}
                            DispatchOutcome::Close(reason) => return reason,
                        }
                    }
                    Some(Err(FrameError::TooLarge { length, .. })) => {
                        warn!(length, "Oversized frame - closing");
                        session.handle.enqueue_message(&dispatch::frame_error_message(
                            ErrorCode::FrameTooLarge,
                            "frame exceeds maximum size",
                        ));
                        return None;
                    }
                    Some(Err(FrameError::Malformed(detail))) => {
                        warn!(detail, "Malformed frame - closing");
                        session.handle.enqueue_message(&dispatch::frame_error_message(
                            ErrorCode::MalformedFrame,
                            detail,
                        ));
                        return None;
                    }
                    Some(Err(FrameError::Compression(detail))) => {
                        warn!(detail = %detail, "Bad compressed frame - closing");
                        session.handle.enqueue_message(&dispatch::frame_error_message(
                            ErrorCode::MalformedFrame,
                            &detail,
                        ));
                        return None;
                    }
                    Some(Err(FrameError::Io(e))) => {
                        debug!(error = %e, "Transport read error");
                        return None;
                    }
                    None => {
                        debug!("Peer closed the connection");
                        return None;
                    }
                },

                queued = outbound_rx.recv() => match queued {
                    Some(frame) => {
                        if let Err(e) = self.transport.send_frame(frame).await {
                            debug!(error = %e, "Transport write error");
                            return None;
                        }
                    }
                    None => return None,
                },

                _ = idle_timer.tick() => {
                    // The idle timer is advanced ONLY by PING receipt.
                    if session.last_ping.elapsed() >= idle_timeout {
                        info!("Idle timeout");
                        return Some("Session timeout".into());
                    }
                }

                _ = cancel.cancelled() => {
                    return handle.take_close_reason();
                }

                _ = shutdown_rx.recv() => {
                    return Some("Server shutting down".into());
                }
            }
        }
    }

    fn teardown(&self, session: &mut Session) {
        let hub = &self.hub;
        hub.dm
            .session_closed(hub, session.id, session.display_name().as_deref());
        hub.broker.unregister(session.id);
        hub.limits.remove_session(session.id);
        if session.announced_online {
            if let Some(name) = session.display_name() {
                hub.broker.broadcast_all(&Message::ServerPresence(ServerPresence {
                    nickname: name,
                    online: false,
                }));
            }
        }
    }
}

/// Whether a user gets the admin flag: persisted flag bit or membership in
/// the configured admin list.
pub fn admin_status(hub: &Hub, user: &User) -> bool {
    user.is_admin()
        || hub
            .config
            .admin_users
            .iter()
            .any(|n| n.eq_ignore_ascii_case(&user.nickname))
}

async fn resolve_ssh_identity(
    hub: &Hub,
    identity: &SshIdentity,
    now: i64,
) -> Result<SshResolution, RepoError> {
    if let Some((key, user)) = hub.repo.ssh_key_by_fingerprint(&identity.fingerprint).await? {
        hub.repo.touch_ssh_key(key.id, now).await?;

        // Gate 2: banned users fail authentication but may stay anonymous.
        if let Some(verdict) = hub.bans.check_user(Some(user.id), Some(&user.nickname), now) {
            if !verdict.shadow {
                return Ok(SshResolution::Banned(verdict.reason));
            }
        }
        return Ok(SshResolution::Authenticated(Box::new(user)));
    }

    // Unknown key. Auto-register the SSH username when it is unclaimed; a
    // claimed username means this key does not own that identity.
    if hub.repo.user_by_nickname(&identity.username).await?.is_some() {
        return Ok(SshResolution::Rejected(
            "SSH username is registered to a different user".into(),
        ));
    }

    match hub
        .repo
        .create_user(&identity.username, None, 0, now)
        .await
    {
        Ok(user) => {
            hub.repo
                .add_ssh_key(
                    user.id,
                    &identity.fingerprint,
                    &identity.key_type,
                    "auto-registered",
                    now,
                )
                .await?;
            info!(user = %user.nickname, "Auto-registered SSH user");
            Ok(SshResolution::Authenticated(Box::new(user)))
        }
        // Unique-index race: someone claimed the name concurrently.
        Err(RepoError::NicknameTaken(_)) => Ok(SshResolution::Rejected(
            "SSH username was just registered by someone else".into(),
        )),
        Err(e) => Err(e),
    }
}
