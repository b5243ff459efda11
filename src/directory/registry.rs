//! Directory entry registry, keyed by `hostname:port`.

use dashmap::DashMap;
use superchat_proto::messages::{Heartbeat, RegisterServer, ServerEntry};

/// A verified, registered server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub hostname: String,
    pub port: u16,
    pub name: String,
    pub description: String,
    pub max_users: u32,
    pub is_public: bool,
    pub channel_count: u32,
    pub user_count: u32,
    pub uptime_seconds: u64,
    pub registered_at: i64,
    pub last_heartbeat_at: i64,
    /// Seconds; assigned at registration from the load table.
    pub heartbeat_interval: u32,
}

impl DirectoryEntry {
    /// Evicted once three expected heartbeats have been missed.
    pub fn is_stale(&self, now: i64) -> bool {
        let window = i64::from(self.heartbeat_interval) * 3 * 1000;
        now - self.last_heartbeat_at > window
    }

    pub fn to_wire(&self) -> ServerEntry {
        ServerEntry {
            hostname: self.hostname.clone(),
            port: self.port,
            name: self.name.clone(),
            description: self.description.clone(),
            max_users: self.max_users,
            is_public: self.is_public,
            channel_count: self.channel_count,
            user_count: self.user_count,
            uptime_seconds: self.uptime_seconds,
        }
    }
}

/// `hostname:port`-keyed entry table. Duplicate registration = update.
#[derive(Default)]
pub struct Registry {
    entries: DashMap<(String, u16), DirectoryEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, hostname: &str, port: u16) -> bool {
        self.entries.contains_key(&(hostname.to_string(), port))
    }

    /// Insert or refresh an entry from a verified REGISTER_SERVER.
    pub fn upsert(&self, reg: &RegisterServer, now: i64, heartbeat_interval: u32) {
        let key = (reg.hostname.clone(), reg.port);
        let registered_at = self
            .entries
            .get(&key)
            .map(|e| e.registered_at)
            .unwrap_or(now);
        self.entries.insert(
            key,
            DirectoryEntry {
                hostname: reg.hostname.clone(),
                port: reg.port,
                name: reg.name.clone(),
                description: reg.description.clone(),
                max_users: reg.max_users,
                is_public: reg.is_public,
                channel_count: reg.channel_count,
                user_count: reg.user_count,
                uptime_seconds: reg.uptime_seconds,
                registered_at,
                last_heartbeat_at: now,
                heartbeat_interval,
            },
        );
    }

    /// Admit an entry learned through gossip (already verified).
    pub fn admit(&self, entry: &ServerEntry, now: i64, heartbeat_interval: u32) {
        let key = (entry.hostname.clone(), entry.port);
        self.entries.entry(key).or_insert_with(|| DirectoryEntry {
            hostname: entry.hostname.clone(),
            port: entry.port,
            name: entry.name.clone(),
            description: entry.description.clone(),
            max_users: entry.max_users,
            is_public: entry.is_public,
            channel_count: entry.channel_count,
            user_count: entry.user_count,
            uptime_seconds: entry.uptime_seconds,
            registered_at: now,
            last_heartbeat_at: now,
            heartbeat_interval,
        });
    }

    /// Refresh an entry from a HEARTBEAT. Returns its assigned interval,
    /// or `None` for unknown entries (the sender must re-register).
    pub fn heartbeat(&self, hb: &Heartbeat, now: i64) -> Option<u32> {
        let key = (hb.hostname.clone(), hb.port);
        let mut entry = self.entries.get_mut(&key)?;
        entry.last_heartbeat_at = now;
        entry.user_count = hb.user_count;
        entry.channel_count = hb.channel_count;
        entry.uptime_seconds = hb.uptime_seconds;
        Some(entry.heartbeat_interval)
    }

    /// Drop entries that missed three heartbeat intervals.
    pub fn evict_stale(&self, now: i64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_stale(now));
        before - self.entries.len()
    }

    /// Public entries for SERVER_LIST.
    pub fn snapshot(&self) -> Vec<ServerEntry> {
        let mut out: Vec<ServerEntry> = self
            .entries
            .iter()
            .filter(|e| e.is_public)
            .map(|e| e.to_wire())
            .collect();
        out.sort_by(|a, b| (&a.hostname, a.port).cmp(&(&b.hostname, b.port)));
        out
    }

    /// All entries, including private ones (gossip peers).
    pub fn all(&self) -> Vec<DirectoryEntry> {
        self.entries.iter().map(|e| e.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg(host: &str, port: u16) -> RegisterServer {
        RegisterServer {
            hostname: host.into(),
            port,
            name: "srv".into(),
            description: String::new(),
            max_users: 100,
            is_public: true,
            channel_count: 1,
            user_count: 2,
            uptime_seconds: 3,
        }
    }

    #[test]
    fn upsert_updates_in_place() {
        let registry = Registry::new();
        registry.upsert(&reg("a", 1), 1_000, 300);
        let mut second = reg("a", 1);
        second.user_count = 99;
        registry.upsert(&second, 2_000, 300);

        assert_eq!(registry.len(), 1);
        let entry = &registry.all()[0];
        assert_eq!(entry.user_count, 99);
        assert_eq!(entry.registered_at, 1_000, "registration time survives upsert");
    }

    #[test]
    fn eviction_after_three_missed_intervals() {
        let registry = Registry::new();
        registry.upsert(&reg("a", 1), 0, 300);
        // 3 × 300 s window: still alive at the boundary, gone after it.
        assert_eq!(registry.evict_stale(900_000), 0);
        assert_eq!(registry.evict_stale(900_001), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn heartbeat_refreshes_and_unknown_is_rejected() {
        let registry = Registry::new();
        registry.upsert(&reg("a", 1), 0, 300);
        let hb = Heartbeat {
            hostname: "a".into(),
            port: 1,
            user_count: 7,
            channel_count: 8,
            uptime_seconds: 9,
        };
        assert_eq!(registry.heartbeat(&hb, 500_000), Some(300));
        assert_eq!(registry.evict_stale(1_000_000), 0);

        let unknown = Heartbeat { hostname: "b".into(), ..hb };
        assert_eq!(registry.heartbeat(&unknown, 500_000), None);
    }

    #[test]
    fn snapshot_hides_private_entries() {
        let registry = Registry::new();
        let mut private = reg("p", 1);
        private.is_public = false;
        registry.upsert(&private, 0, 300);
        registry.upsert(&reg("a", 2), 0, 300);
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].hostname, "a");
    }
}
