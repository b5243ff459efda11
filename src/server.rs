//! Embeddable server assembly.
//!
//! `main` and the integration tests share this: construct a [`Server`]
//! from an explicit [`Config`] (and optionally a repository), and
//! everything - listeners, sweeper, directory loops - comes up behind it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::Config;
use crate::hub::{now_ms, Hub};
use crate::network::{spawn_ssh_listener, Gateway};
use crate::repo::{MemoryRepository, Repository};

/// A running server instance.
pub struct Server {
    pub hub: Arc<Hub>,
    tcp_addr: SocketAddr,
    websocket_addr: Option<SocketAddr>,
}

impl Server {
    /// Start with the in-memory repository.
    pub async fn start(config: Config) -> anyhow::Result<Self> {
        Self::start_with_repo(config, Arc::new(MemoryRepository::new())).await
    }

    /// Start with an explicit repository implementation.
    pub async fn start_with_repo(
        config: Config,
        repo: Arc<dyn Repository>,
    ) -> anyhow::Result<Self> {
        let hub = Hub::new(config, repo);
        hub.bans.reload(now_ms()).await?;

        let gateway = Gateway::bind(Arc::clone(&hub)).await?;
        let tcp_addr = gateway.tcp_addr()?;
        let websocket_addr = gateway.websocket_addr();
        tokio::spawn(gateway.run());

        spawn_ssh_listener(Arc::clone(&hub))?;
        crate::sweeper::spawn_retention_sweeper(Arc::clone(&hub));
        crate::sweeper::spawn_maintenance(Arc::clone(&hub));

        if hub.config.directory.enabled {
            crate::directory::spawn_eviction_loop(Arc::clone(&hub));
            crate::directory::spawn_gossip_loop(Arc::clone(&hub));
        }
        if !hub.config.directory.announce.is_empty() {
            crate::directory::announce_at_startup(Arc::clone(&hub));
        }

        info!(addr = %tcp_addr, "Server started");
        Ok(Self {
            hub,
            tcp_addr,
            websocket_addr,
        })
    }

    /// The bound TCP address (tests bind port 0).
    pub fn tcp_addr(&self) -> SocketAddr {
        self.tcp_addr
    }

    /// The bound WebSocket address, when enabled.
    pub fn websocket_addr(&self) -> Option<SocketAddr> {
        self.websocket_addr
    }

    /// Graceful shutdown: DISCONNECT every session, give writers the
    /// configured grace window to flush, then return.
    pub async fn shutdown(&self) {
        self.hub.shutdown();
        let grace = Duration::from_secs(self.hub.config.timeouts.shutdown_grace_secs);
        tokio::time::sleep(grace.min(Duration::from_secs(10))).await;
    }
}
