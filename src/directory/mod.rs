//! Federated directory subsystem.
//!
//! A directory-enabled server accepts REGISTER_SERVER announcements,
//! verifies each announcer over a back-connection challenge, tracks
//! entries with heartbeats, and gossips its view to other directories on a
//! randomized interval. Chat-only servers ignore REGISTER_SERVER and serve
//! an empty SERVER_LIST. No directory is authoritative.

mod gossip;
mod peer;
mod registry;
mod verify;

pub use gossip::spawn_gossip_loop;
pub use peer::{announce_at_startup, fetch_server_list};
pub use registry::{DirectoryEntry, Registry};
pub use verify::{verify_server, VERIFY_TIMEOUT};

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::DirectorySection;
use crate::hub::{now_ms, Hub};

/// Directory state owned by the hub.
pub struct Directory {
    pub enabled: bool,
    pub registry: Registry,
}

impl Directory {
    pub fn new(config: &DirectorySection) -> Self {
        Self {
            enabled: config.enabled,
            registry: Registry::new(),
        }
    }

    /// Heartbeat interval from the load table, by current registry size.
    pub fn assigned_interval(&self) -> u32 {
        match self.registry.len() {
            0..=100 => 300,
            101..=999 => 600,
            1000..=4999 => 1800,
            _ => 3600,
        }
    }
}

/// Periodic eviction of entries that missed three heartbeat intervals.
pub fn spawn_eviction_loop(hub: Arc<Hub>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut shutdown_rx = hub.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let evicted = hub.directory.registry.evict_stale(now_ms());
                    if evicted > 0 {
                        info!(evicted, "Stale directory entries evicted");
                    }
                    crate::metrics::DIRECTORY_ENTRIES.set(hub.directory.registry.len() as i64);
                }
                _ = shutdown_rx.recv() => break,
            }
        }
    });
}
