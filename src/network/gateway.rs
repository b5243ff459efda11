//! Gateway - accepts TCP and WebSocket connections and spawns sessions.
//!
//! The SSH listener is separate (see [`super::ssh`]) because russh owns its
//! own accept loop; it feeds the same session entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::hub::Hub;
use crate::network::FramedTransport;
use crate::session::Connection;

/// TCP + WebSocket acceptor.
pub struct Gateway {
    tcp: TcpListener,
    websocket: Option<TcpListener>,
    hub: Arc<Hub>,
}

impl Gateway {
    /// Bind the configured listeners.
    pub async fn bind(hub: Arc<Hub>) -> std::io::Result<Self> {
        let tcp = TcpListener::bind(hub.config.listen.tcp).await?;
        info!(addr = %tcp.local_addr()?, "TCP gateway listening");

        let websocket = match hub.config.listen.websocket {
            Some(addr) => {
                let listener = TcpListener::bind(addr).await?;
                info!(addr = %listener.local_addr()?, "WebSocket gateway listening");
                Some(listener)
            }
            None => None,
        };

        Ok(Self { tcp, websocket, hub })
    }

    /// The bound TCP address (tests bind port 0).
    pub fn tcp_addr(&self) -> std::io::Result<SocketAddr> {
        self.tcp.local_addr()
    }

    /// The bound WebSocket address, when enabled.
    pub fn websocket_addr(&self) -> Option<SocketAddr> {
        self.websocket.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Accept until shutdown.
    pub async fn run(self) -> std::io::Result<()> {
        let mut shutdown_rx = self.hub.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                accepted = self.tcp.accept() => match accepted {
                    Ok((stream, addr)) => self.spawn_tcp(stream, addr),
                    Err(e) => error!(error = %e, "TCP accept failed"),
                },
                accepted = accept_ws(self.websocket.as_ref()) => match accepted {
                    Ok((stream, addr)) => self.spawn_websocket(stream, addr),
                    Err(e) => error!(error = %e, "WebSocket accept failed"),
                },
                _ = shutdown_rx.recv() => {
                    info!("Gateway stopping");
                    return Ok(());
                }
            }
        }
    }

    fn spawn_tcp(&self, stream: TcpStream, addr: SocketAddr) {
        let hub = Arc::clone(&self.hub);
        if !hub.acquire_connection_slot(addr.ip()) {
            warn!(%addr, "Connection refused: per-IP cap reached");
            return;
        }
        tokio::spawn(async move {
            let _ = stream.set_nodelay(true);
            let transport = FramedTransport::tcp(stream);
            run_session(hub, transport, addr, None).await;
        });
    }

    fn spawn_websocket(&self, stream: TcpStream, addr: SocketAddr) {
        let hub = Arc::clone(&self.hub);
        if !hub.acquire_connection_slot(addr.ip()) {
            warn!(%addr, "Connection refused: per-IP cap reached");
            return;
        }
        tokio::spawn(async move {
            match tokio_tungstenite::accept_async(stream).await {
                Ok(ws) => {
                    let transport = FramedTransport::websocket(ws);
                    run_session(hub, transport, addr, None).await;
                }
                Err(e) => {
                    debug!(%addr, error = %e, "WebSocket handshake failed");
                    hub.release_connection_slot(addr.ip());
                }
            }
        });
    }
}

async fn accept_ws(
    listener: Option<&TcpListener>,
) -> std::io::Result<(TcpStream, SocketAddr)> {
    match listener {
        Some(listener) => listener.accept().await,
        None => std::future::pending().await,
    }
}

/// Shared session entry point for every transport. Releases the per-IP
/// slot when the session ends.
pub(crate) async fn run_session(
    hub: Arc<Hub>,
    transport: FramedTransport,
    addr: SocketAddr,
    ssh_identity: Option<super::SshIdentity>,
) {
    let session_id = hub.next_session_id();
    let connection = Connection::new(session_id, transport, addr, Arc::clone(&hub), ssh_identity);
    if let Err(e) = connection.run().await {
        debug!(session = session_id, %addr, error = %e, "Session ended with error");
    }
    hub.release_connection_slot(addr.ip());
    debug!(session = session_id, %addr, "Session closed");
}
