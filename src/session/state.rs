//! Per-session mutable state, owned by the connection task.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::time::Instant;

use crate::broker::SessionHandle;
use crate::error::HandlerError;
use crate::security::LimiterKey;

/// Identity attached after successful authentication.
#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub id: u64,
    pub nickname: String,
    pub is_admin: bool,
}

/// Connection-scoped state. The broker sees only the [`SessionHandle`];
/// everything here is mutated exclusively by this session's own handlers.
pub struct Session {
    pub id: u64,
    pub remote_ip: IpAddr,
    pub handle: SessionHandle,
    pub user: Option<AuthedUser>,
    /// Display nickname without the anonymous sigil; kept in sync with
    /// `user.nickname` while authenticated.
    pub nickname: Option<String>,
    pub active_channel: Option<(u64, Option<u64>)>,
    pub joined_channels: HashSet<u64>,
    pub subscribed_channels: HashSet<u64>,
    /// Thread-root id -> owning channel id.
    pub subscribed_threads: HashMap<u64, u64>,
    /// Advanced ONLY by PING receipt.
    pub last_ping: Instant,
    /// Failed AUTH_REQUEST count this session; five locks further attempts.
    pub auth_failures: u8,
    /// Whether SERVER_PRESENCE(online=true) has been emitted.
    pub announced_online: bool,
}

/// Failed attempts after which the session is locked to anonymous.
pub const MAX_AUTH_FAILURES: u8 = 5;

impl Session {
    pub fn new(id: u64, remote_ip: IpAddr, handle: SessionHandle) -> Self {
        Self {
            id,
            remote_ip,
            handle,
            user: None,
            nickname: None,
            active_channel: None,
            joined_channels: HashSet::new(),
            subscribed_channels: HashSet::new(),
            subscribed_threads: HashMap::new(),
            last_ping: Instant::now(),
            auth_failures: 0,
            announced_online: false,
        }
    }

    /// Display name as rendered to other users: registered nicknames are
    /// bare, anonymous nicknames carry the `~` sigil.
    pub fn display_name(&self) -> Option<String> {
        match (&self.user, &self.nickname) {
            (Some(user), _) => Some(user.nickname.clone()),
            (None, Some(nick)) => Some(format!("~{nick}")),
            (None, None) => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.user.as_ref().is_some_and(|u| u.is_admin)
    }

    pub fn auth_locked(&self) -> bool {
        self.auth_failures >= MAX_AUTH_FAILURES
    }

    /// Rate-limiter identity: user id once authenticated, session id before.
    pub fn limiter_key(&self) -> LimiterKey {
        match &self.user {
            Some(user) => LimiterKey::User(user.id),
            None => LimiterKey::Session(self.id),
        }
    }

    /// The display name, or the validation error POST_MESSAGE reports.
    pub fn require_display_name(&self) -> Result<String, HandlerError> {
        self.display_name()
            .ok_or_else(|| HandlerError::Validation("set a nickname first".into()))
    }

    /// The authenticated user, or ERROR 2002.
    pub fn require_user(&self) -> Result<&AuthedUser, HandlerError> {
        self.user.as_ref().ok_or(HandlerError::RegistrationRequired)
    }

    /// The authenticated admin, or ERROR 3001.
    pub fn require_admin(&self) -> Result<&AuthedUser, HandlerError> {
        let user = self.require_user()?;
        if user.is_admin {
            Ok(user)
        } else {
            Err(HandlerError::AdminRequired)
        }
    }

    /// Publish identity changes to the broker-visible shared state.
    pub fn sync_shared(&self) {
        self.handle.shared.set_identity(
            self.user.as_ref().map(|u| u.id),
            self.display_name(),
            self.is_admin(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::SessionShared;
    use std::sync::Arc;

    fn session() -> Session {
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        let shared = Arc::new(SessionShared::new(ip, 0));
        let (handle, _rx) = SessionHandle::new(1, shared);
        Session::new(1, ip, handle)
    }

    #[test]
    fn anonymous_display_name_carries_sigil() {
        let mut s = session();
        assert_eq!(s.display_name(), None);
        s.nickname = Some("alice".into());
        assert_eq!(s.display_name().as_deref(), Some("~alice"));
        s.user = Some(AuthedUser {
            id: 9,
            nickname: "alice".into(),
            is_admin: false,
        });
        assert_eq!(s.display_name().as_deref(), Some("alice"));
    }

    #[test]
    fn limiter_key_switches_on_auth() {
        let mut s = session();
        assert_eq!(s.limiter_key(), LimiterKey::Session(1));
        s.user = Some(AuthedUser {
            id: 9,
            nickname: "a".into(),
            is_admin: false,
        });
        assert_eq!(s.limiter_key(), LimiterKey::User(9));
    }

    #[test]
    fn admin_gate() {
        let mut s = session();
        assert!(matches!(s.require_admin(), Err(HandlerError::RegistrationRequired)));
        s.user = Some(AuthedUser {
            id: 9,
            nickname: "a".into(),
            is_admin: false,
        });
        assert!(matches!(s.require_admin(), Err(HandlerError::AdminRequired)));
    }
}
