//! Hub - shared server state.
//!
//! One `Arc<Hub>` is threaded through listeners, sessions, handlers, and
//! background tasks. Sessions are held by id inside the broker; sessions
//! reference the hub by shared handle, and teardown removes the id from
//! every broker set before the session object drops.

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::broker::Broker;
use crate::config::Config;
use crate::directory::Directory;
use crate::dm::DmOrchestrator;
use crate::repo::Repository;
use crate::security::{BanEnforcer, RateLimitManager};

/// Current UNIX time in milliseconds, as stamped on every entity.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Shared server state.
pub struct Hub {
    pub config: Config,
    pub repo: Arc<dyn Repository>,
    pub broker: Broker,
    pub bans: BanEnforcer,
    pub limits: RateLimitManager,
    pub dm: DmOrchestrator,
    pub directory: Directory,
    /// Fan-in for graceful shutdown; every long-lived task subscribes.
    pub shutdown_tx: broadcast::Sender<()>,
    started_at: Instant,
    session_ids: AtomicU64,
    connections_per_ip: DashMap<IpAddr, u32>,
}

impl Hub {
    pub fn new(config: Config, repo: Arc<dyn Repository>) -> Arc<Self> {
        let (shutdown_tx, _) = broadcast::channel(8);
        Arc::new(Self {
            bans: BanEnforcer::new(Arc::clone(&repo)),
            limits: RateLimitManager::new(config.limits),
            dm: DmOrchestrator::new(),
            directory: Directory::new(&config.directory),
            config,
            repo,
            broker: Broker::new(),
            shutdown_tx,
            started_at: Instant::now(),
            session_ids: AtomicU64::new(0),
            connections_per_ip: DashMap::new(),
        })
    }

    /// Unique session id for the process lifetime.
    pub fn next_session_id(&self) -> u64 {
        self.session_ids.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// The SERVER_CONFIG payload sent right after accept.
    pub fn server_config(&self) -> superchat_proto::messages::ServerConfig {
        let limits = &self.config.limits;
        superchat_proto::messages::ServerConfig {
            protocol_version: superchat_proto::PROTOCOL_VERSION,
            max_message_rate: limits.max_message_rate,
            max_channel_creates: limits.max_channel_creates,
            inactive_cleanup_days: limits.inactive_cleanup_days,
            max_connections_per_ip: limits.max_connections_per_ip,
            max_message_length: limits.max_message_length,
            max_thread_subs: limits.max_thread_subs,
            max_channel_subs: limits.max_channel_subs,
            directory_enabled: self.config.directory.enabled,
        }
    }

    /// Reserve a connection slot for an IP. `false` when the per-IP cap is
    /// already reached; the caller must refuse the connection.
    pub fn acquire_connection_slot(&self, ip: IpAddr) -> bool {
        let cap = u32::from(self.config.limits.max_connections_per_ip);
        let mut slot = self.connections_per_ip.entry(ip).or_insert(0);
        if *slot >= cap {
            return false;
        }
        *slot += 1;
        true
    }

    /// Release a previously acquired slot.
    pub fn release_connection_slot(&self, ip: IpAddr) {
        if let Some(mut slot) = self.connections_per_ip.get_mut(&ip) {
            *slot = slot.saturating_sub(1);
        }
        self.connections_per_ip.retain(|_, count| *count > 0);
    }

    /// Signal every task and session to shut down.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::MemoryRepository;

    #[test]
    fn session_ids_are_unique_and_increasing() {
        let hub = Hub::new(Config::default(), Arc::new(MemoryRepository::new()));
        let a = hub.next_session_id();
        let b = hub.next_session_id();
        assert!(b > a);
    }

    #[test]
    fn per_ip_connection_cap() {
        let mut config = Config::default();
        config.limits.max_connections_per_ip = 2;
        let hub = Hub::new(config, Arc::new(MemoryRepository::new()));
        let ip: IpAddr = "192.0.2.1".parse().unwrap();

        assert!(hub.acquire_connection_slot(ip));
        assert!(hub.acquire_connection_slot(ip));
        assert!(!hub.acquire_connection_slot(ip));

        hub.release_connection_slot(ip);
        assert!(hub.acquire_connection_slot(ip));
    }

    #[test]
    fn server_config_mirrors_limits() {
        let mut config = Config::default();
        config.limits.max_message_length = 1234;
        let hub = Hub::new(config, Arc::new(MemoryRepository::new()));
        let sc = hub.server_config();
        assert_eq!(sc.max_message_length, 1234);
        assert_eq!(sc.protocol_version, superchat_proto::PROTOCOL_VERSION);
    }
}
