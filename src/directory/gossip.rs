//! Directory gossip loop.
//!
//! On a randomized 1–6 hour interval, query the registered servers for
//! their LIST_SERVERS view. Unknown entries are verified with the usual
//! back-connection challenge before being admitted; nothing is trusted on
//! hearsay. Optionally announce ourselves to discovered directories so
//! learning is bidirectional.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::hub::{now_ms, Hub};

use super::peer;
use super::verify::verify_server;

const GOSSIP_MIN_SECS: u64 = 3600;
const GOSSIP_MAX_SECS: u64 = 6 * 3600;

fn next_delay() -> Duration {
    Duration::from_secs(rand::thread_rng().gen_range(GOSSIP_MIN_SECS..=GOSSIP_MAX_SECS))
}

/// Run gossip until shutdown. Only spawned for directory-enabled servers.
pub fn spawn_gossip_loop(hub: Arc<Hub>) {
    tokio::spawn(async move {
        let mut shutdown_rx = hub.shutdown_tx.subscribe();
        loop {
            let delay = next_delay();
            debug!(secs = delay.as_secs(), "Next gossip round scheduled");
            tokio::select! {
                _ = tokio::time::sleep(delay) => gossip_round(&hub).await,
                _ = shutdown_rx.recv() => break,
            }
        }
    });
}

async fn gossip_round(hub: &Arc<Hub>) {
    let peers = hub.directory.registry.all();
    if peers.is_empty() {
        return;
    }
    info!(peers = peers.len(), "Gossip round starting");

    for peer_entry in peers {
        let list = match peer::fetch_server_list(&peer_entry.hostname, peer_entry.port).await {
            Ok(list) => list,
            Err(e) => {
                warn!(
                    host = %peer_entry.hostname,
                    port = peer_entry.port,
                    error = %e,
                    "Gossip peer query failed"
                );
                continue;
            }
        };

        for discovered in list {
            if hub
                .directory
                .registry
                .contains(&discovered.hostname, discovered.port)
            {
                continue;
            }
            // Verify before admitting; silent admission on success.
            match verify_server(&discovered.hostname, discovered.port).await {
                Ok(()) => {
                    let interval = hub.directory.assigned_interval();
                    hub.directory.registry.admit(&discovered, now_ms(), interval);
                    debug!(
                        host = %discovered.hostname,
                        port = discovered.port,
                        "Gossip-discovered server admitted"
                    );

                    if hub.config.directory.gossip_announce {
                        if let Err(e) =
                            peer::announce_to(hub, &discovered.hostname, discovered.port).await
                        {
                            debug!(
                                host = %discovered.hostname,
                                error = %e,
                                "Announce to discovered directory failed"
                            );
                        }
                    }
                }
                Err(e) => {
                    debug!(
                        host = %discovered.hostname,
                        port = discovered.port,
                        error = %e,
                        "Gossip-discovered server failed verification"
                    );
                }
            }
        }
    }
}
