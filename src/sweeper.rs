//! Background maintenance: retention sweep and rate-limiter pruning.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::hub::{now_ms, Hub};

/// Periodic purge of messages past their channel's retention window.
/// Works in bounded batches and yields between them; the repository call
/// holds no broker locks.
pub fn spawn_retention_sweeper(hub: Arc<Hub>) {
    tokio::spawn(async move {
        let period = Duration::from_secs(hub.config.retention.sweep_interval_secs);
        let batch = hub.config.retention.sweep_batch;
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut shutdown_rx = hub.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let mut total = 0usize;
                    loop {
                        match hub.repo.purge_expired(now_ms(), batch).await {
                            Ok(0) => break,
                            Ok(purged) => {
                                total += purged;
                                tokio::task::yield_now().await;
                            }
                            Err(e) => {
                                warn!(error = %e, "Retention sweep failed");
                                break;
                            }
                        }
                    }
                    if total > 0 {
                        info!(purged = total, "Retention sweep completed");
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }
    });
}

/// Rate-limiter table pruning, every five minutes.
pub fn spawn_maintenance(hub: Arc<Hub>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut shutdown_rx = hub.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                _ = interval.tick() => hub.limits.cleanup(),
                _ = shutdown_rx.recv() => break,
            }
        }
    });
}
