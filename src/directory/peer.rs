//! Outbound directory client: announcing ourselves and querying peers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use futures_util::{SinkExt, StreamExt};
use superchat_proto::messages::{
    Heartbeat, ListServers, Message, RegisterAck, RegisterServer, ServerEntry,
};
use superchat_proto::FrameCodec;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{info, warn};

use crate::hub::Hub;

const PEER_IO_TIMEOUT: Duration = Duration::from_secs(10);

type PeerConn = Framed<TcpStream, FrameCodec>;

async fn connect(host: &str, port: u16) -> anyhow::Result<PeerConn> {
    let stream = tokio::time::timeout(PEER_IO_TIMEOUT, TcpStream::connect((host, port)))
        .await
        .map_err(|_| anyhow::anyhow!("connect timeout"))?
        .with_context(|| format!("connecting to {host}:{port}"))?;
    Ok(Framed::new(stream, FrameCodec::new()))
}

/// Read frames until one decodes to a message the filter accepts.
async fn wait_for<T>(
    conn: &mut PeerConn,
    mut filter: impl FnMut(Message) -> Option<T>,
) -> anyhow::Result<T> {
    let deadline = tokio::time::Instant::now() + PEER_IO_TIMEOUT;
    loop {
        let frame = tokio::time::timeout_at(deadline, conn.next())
            .await
            .map_err(|_| anyhow::anyhow!("peer response timeout"))?;
        let Some(frame) = frame else {
            bail!("peer closed the connection");
        };
        if let Ok(msg) = frame?.message() {
            if let Some(out) = filter(msg) {
                return Ok(out);
            }
        }
    }
}

/// Fetch a peer directory's SERVER_LIST.
pub async fn fetch_server_list(host: &str, port: u16) -> anyhow::Result<Vec<ServerEntry>> {
    let mut conn = connect(host, port).await?;
    conn.send(Message::ListServers(ListServers).to_frame()).await?;
    let list = wait_for(&mut conn, |msg| match msg {
        Message::ServerList(list) => Some(list.servers),
        _ => None,
    })
    .await?;
    Ok(list)
}

async fn channel_count(hub: &Hub) -> u32 {
    hub.repo
        .list_channels()
        .await
        .map(|channels| channels.len() as u32)
        .unwrap_or(0)
}

/// The REGISTER_SERVER payload describing this server.
async fn self_registration(hub: &Hub) -> Option<RegisterServer> {
    let directory = &hub.config.directory;
    let hostname = directory.hostname.clone()?;
    Some(RegisterServer {
        hostname,
        port: directory.port.unwrap_or_else(|| hub.config.listen.tcp.port()),
        name: hub.config.server.name.clone(),
        description: hub.config.server.description.clone(),
        max_users: directory.max_users,
        is_public: directory.is_public,
        channel_count: channel_count(hub).await,
        user_count: hub.broker.session_count() as u32,
        uptime_seconds: hub.uptime_seconds(),
    })
}

/// Announce this server to one directory. On success, returns the assigned
/// heartbeat interval.
pub async fn announce_to(hub: &Hub, host: &str, port: u16) -> anyhow::Result<u32> {
    let Some(registration) = self_registration(hub).await else {
        bail!("directory.hostname not configured");
    };
    let mut conn = connect(host, port).await?;
    conn.send(Message::RegisterServer(registration).to_frame()).await?;

    // The directory back-connects and challenges us while we wait; our own
    // gateway answers that on a separate session.
    let ack: RegisterAck = wait_for(&mut conn, |msg| match msg {
        Message::RegisterAck(ack) => Some(ack),
        _ => None,
    })
    .await?;

    if !ack.success {
        bail!(
            "registration rejected: {}",
            ack.message.unwrap_or_else(|| "no reason given".into())
        );
    }
    Ok(ack.heartbeat_interval)
}

/// Heartbeat loop against one directory, at its assigned interval.
fn spawn_heartbeat_loop(hub: Arc<Hub>, host: String, port: u16, interval_secs: u32) {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_secs(u64::from(interval_secs.max(1))));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        interval.tick().await;
        let mut shutdown_rx = hub.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = send_heartbeat(&hub, &host, port).await {
                        warn!(%host, port, error = %e, "Directory heartbeat failed");
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }
    });
}

async fn send_heartbeat(hub: &Hub, host: &str, port: u16) -> anyhow::Result<()> {
    let directory = &hub.config.directory;
    let Some(hostname) = directory.hostname.clone() else {
        bail!("directory.hostname not configured");
    };
    let heartbeat = Heartbeat {
        hostname,
        port: directory.port.unwrap_or_else(|| hub.config.listen.tcp.port()),
        user_count: hub.broker.session_count() as u32,
        channel_count: channel_count(hub).await,
        uptime_seconds: hub.uptime_seconds(),
    };
    let mut conn = connect(host, port).await?;
    conn.send(Message::Heartbeat(heartbeat).to_frame()).await?;
    wait_for(&mut conn, |msg| match msg {
        Message::HeartbeatAck(ack) => Some(ack),
        _ => None,
    })
    .await?;
    Ok(())
}

/// Announce to every `[directory] announce` target, then keep each entry
/// fresh with a heartbeat loop.
pub fn announce_at_startup(hub: Arc<Hub>) {
    for target in hub.config.directory.announce.clone() {
        let Some((host, port)) = parse_target(&target) else {
            warn!(target, "Skipping unparseable announce target");
            continue;
        };
        let hub = Arc::clone(&hub);
        tokio::spawn(async move {
            match announce_to(&hub, &host, port).await {
                Ok(interval) => {
                    info!(%host, port, interval, "Announced to directory");
                    spawn_heartbeat_loop(hub, host, port, interval);
                }
                Err(e) => {
                    warn!(%host, port, error = %e, "Directory announcement failed");
                }
            }
        });
    }
}

pub(super) fn parse_target(target: &str) -> Option<(String, u16)> {
    let (host, port) = target.rsplit_once(':')?;
    Some((host.to_string(), port.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_parsing() {
        assert_eq!(parse_target("example.org:6465"), Some(("example.org".into(), 6465)));
        assert_eq!(parse_target("bad"), None);
        assert_eq!(parse_target("host:notaport"), None);
    }
}
