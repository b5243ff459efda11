//! Ban enforcement.
//!
//! Three gates consult this module: socket accept (IP), authentication
//! (user), and post/edit (user, where shadowbans silently pass and are
//! filtered at fan-out instead). Active bans live in an in-memory cache
//! rebuilt from the repository whenever a ban is placed or lifted, so the
//! hot paths never touch storage. Expired bans are skipped at query time
//! and dropped on the next rebuild.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use ipnet::IpNet;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::repo::{Ban, BanKind, RepoResult, Repository};

/// Outcome of a ban check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanVerdict {
    pub ban_id: u64,
    pub reason: String,
    pub shadow: bool,
}

impl From<&Ban> for BanVerdict {
    fn from(ban: &Ban) -> Self {
        Self {
            ban_id: ban.id,
            reason: ban.reason.clone(),
            shadow: ban.shadow,
        }
    }
}

#[derive(Debug, Clone)]
struct IpRule {
    net: IpNet,
    ban: Ban,
}

#[derive(Default)]
struct Cache {
    ip_rules: Vec<IpRule>,
    by_user: HashMap<u64, Ban>,
    /// Folded nickname -> ban, for bans on anonymous nicknames.
    by_nickname: HashMap<String, Ban>,
}

/// The ban enforcer.
pub struct BanEnforcer {
    repo: Arc<dyn Repository>,
    cache: RwLock<Cache>,
}

impl BanEnforcer {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self {
            repo,
            cache: RwLock::new(Cache::default()),
        }
    }

    /// Parse an `ip_or_cidr` string into a matchable network.
    pub fn parse_ip_rule(raw: &str) -> Option<IpNet> {
        if let Ok(net) = raw.parse::<IpNet>() {
            return Some(net);
        }
        raw.parse::<IpAddr>().ok().map(IpNet::from)
    }

    /// Rebuild the cache from active bans. Called at startup and after
    /// every ban mutation.
    pub async fn reload(&self, now: i64) -> RepoResult<()> {
        let bans = self.repo.list_bans(false, now).await?;
        let mut cache = Cache::default();
        for ban in bans {
            match ban.kind {
                BanKind::Ip => {
                    let Some(raw) = ban.ip_or_cidr.as_deref() else {
                        continue;
                    };
                    match Self::parse_ip_rule(raw) {
                        Some(net) => cache.ip_rules.push(IpRule { net, ban }),
                        None => warn!(rule = raw, "Unparseable IP ban rule skipped"),
                    }
                }
                BanKind::User => {
                    if let Some(user_id) = ban.user_id {
                        cache.by_user.insert(user_id, ban.clone());
                    }
                    if let Some(nickname) = &ban.nickname {
                        cache.by_nickname.insert(nickname.to_lowercase(), ban);
                    }
                }
            }
        }
        info!(
            ip_rules = cache.ip_rules.len(),
            user_bans = cache.by_user.len(),
            "Ban cache reloaded"
        );
        *self.cache.write() = cache;
        Ok(())
    }

    /// Gate 1: socket accept. Shadow IP bans do not refuse the connection.
    pub fn check_ip(&self, ip: IpAddr, now: i64) -> Option<BanVerdict> {
        let cache = self.cache.read();
        cache
            .ip_rules
            .iter()
            .find(|rule| !rule.ban.is_expired(now) && !rule.ban.shadow && rule.net.contains(&ip))
            .map(|rule| BanVerdict::from(&rule.ban))
    }

    /// Gate 2 and 3: user-level ban lookup by id and/or display nickname.
    pub fn check_user(
        &self,
        user_id: Option<u64>,
        nickname: Option<&str>,
        now: i64,
    ) -> Option<BanVerdict> {
        let cache = self.cache.read();
        if let Some(id) = user_id {
            if let Some(ban) = cache.by_user.get(&id) {
                if !ban.is_expired(now) {
                    return Some(BanVerdict::from(ban));
                }
            }
        }
        if let Some(nick) = nickname {
            if let Some(ban) = cache.by_nickname.get(&nick.to_lowercase()) {
                if !ban.is_expired(now) {
                    return Some(BanVerdict::from(ban));
                }
            }
        }
        None
    }

    /// Whether a registered author is currently shadowbanned. Used by the
    /// broker's fan-out filter and by LIST_MESSAGES rendering.
    pub fn is_shadowbanned(&self, user_id: Option<u64>, nickname: Option<&str>, now: i64) -> bool {
        self.check_user(user_id, nickname, now)
            .is_some_and(|v| v.shadow)
    }

    /// Registered user ids currently shadowbanned, for history filtering.
    pub fn shadowbanned_users(&self, now: i64) -> Vec<u64> {
        let cache = self.cache.read();
        cache
            .by_user
            .iter()
            .filter(|(_, ban)| ban.shadow && !ban.is_expired(now))
            .map(|(&id, _)| id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::{MemoryRepository, NewBan};

    fn now() -> i64 {
        1_700_000_000_000
    }

    fn user_ban(user_id: u64, nickname: &str, shadow: bool) -> NewBan {
        NewBan {
            kind: BanKind::User,
            user_id: Some(user_id),
            nickname: Some(nickname.into()),
            ip_or_cidr: None,
            reason: "test".into(),
            shadow,
            banned_at: now(),
            banned_until: None,
            banned_by: "admin".into(),
        }
    }

    #[tokio::test]
    async fn cidr_and_exact_ip_match() {
        let repo = Arc::new(MemoryRepository::new());
        repo.add_ban(NewBan {
            kind: BanKind::Ip,
            user_id: None,
            nickname: None,
            ip_or_cidr: Some("10.1.0.0/16".into()),
            reason: "range".into(),
            shadow: false,
            banned_at: now(),
            banned_until: None,
            banned_by: "admin".into(),
        })
        .await
        .unwrap();
        repo.add_ban(NewBan {
            kind: BanKind::Ip,
            user_id: None,
            nickname: None,
            ip_or_cidr: Some("192.0.2.7".into()),
            reason: "host".into(),
            shadow: false,
            banned_at: now(),
            banned_until: None,
            banned_by: "admin".into(),
        })
        .await
        .unwrap();

        let enforcer = BanEnforcer::new(repo);
        enforcer.reload(now()).await.unwrap();

        assert!(enforcer.check_ip("10.1.2.3".parse().unwrap(), now()).is_some());
        assert!(enforcer.check_ip("192.0.2.7".parse().unwrap(), now()).is_some());
        assert!(enforcer.check_ip("10.2.0.1".parse().unwrap(), now()).is_none());
    }

    #[tokio::test]
    async fn expired_bans_are_ignored() {
        let repo = Arc::new(MemoryRepository::new());
        let mut ban = user_ban(1, "mallory", false);
        ban.banned_until = Some(now() - 1);
        repo.add_ban(ban).await.unwrap();

        let enforcer = BanEnforcer::new(repo);
        enforcer.reload(now()).await.unwrap();
        assert!(enforcer.check_user(Some(1), Some("mallory"), now()).is_none());
    }

    #[tokio::test]
    async fn shadowban_reported_as_shadow() {
        let repo = Arc::new(MemoryRepository::new());
        repo.add_ban(user_ban(1, "mallory", true)).await.unwrap();

        let enforcer = BanEnforcer::new(repo);
        enforcer.reload(now()).await.unwrap();

        assert!(enforcer.is_shadowbanned(Some(1), None, now()));
        assert!(enforcer.is_shadowbanned(None, Some("Mallory"), now()));
        assert_eq!(enforcer.shadowbanned_users(now()), vec![1]);
    }
}
