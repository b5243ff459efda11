//! SSH transport acceptor.
//!
//! SSH is treated as "a framed byte stream plus an authenticated public
//! key": russh verifies key ownership during the handshake, and the
//! session layer receives only the username, the key's SHA-256
//! fingerprint, and the framed channel bytes, bridged through an
//! in-process duplex pipe into the ordinary session loop.

use std::net::SocketAddr;
use std::sync::Arc;

use russh::keys::ssh_key::rand_core::UnwrapErr;
use russh::keys::{Algorithm, HashAlg, PrivateKey, PublicKey};
use russh::server::{Auth, Msg, Server, Session};
use russh::{Channel, ChannelId};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tracing::{debug, info, warn};

use crate::hub::Hub;
use crate::network::gateway::run_session;
use crate::network::FramedTransport;

const PIPE_CAPACITY: usize = 64 * 1024;

/// Identity surfaced by the SSH handshake.
#[derive(Debug, Clone)]
pub struct SshIdentity {
    /// The SSH username the client connected as.
    pub username: String,
    /// `SHA256:<base64>` fingerprint of the verified public key.
    pub fingerprint: String,
    /// Key algorithm name (e.g. `ssh-ed25519`).
    pub key_type: String,
}

/// Load the configured host key or generate an ephemeral one.
fn host_key(hub: &Hub) -> anyhow::Result<PrivateKey> {
    if let Some(path) = &hub.config.listen.ssh_host_key {
        let key = russh::keys::load_secret_key(path, None)?;
        return Ok(key);
    }
    warn!("No ssh_host_key configured - generating an ephemeral host key");
    Ok(PrivateKey::random(
        &mut UnwrapErr(getrandom::SysRng),
        Algorithm::Ed25519,
    )?)
}

/// Bind the SSH listener, if configured.
pub fn spawn_ssh_listener(hub: Arc<Hub>) -> anyhow::Result<()> {
    let Some(addr) = hub.config.listen.ssh else {
        return Ok(());
    };
    let key = host_key(&hub)?;
    let config = Arc::new(russh::server::Config {
        keys: vec![key],
        inactivity_timeout: None,
        ..Default::default()
    });

    let mut acceptor = SshAcceptor { hub };
    tokio::spawn(async move {
        info!(%addr, "SSH gateway listening");
        if let Err(e) = acceptor.run_on_address(config, addr).await {
            warn!(error = %e, "SSH listener terminated");
        }
    });
    Ok(())
}

struct SshAcceptor {
    hub: Arc<Hub>,
}

impl Server for SshAcceptor {
    type Handler = SshConnection;

    fn new_client(&mut self, peer_addr: Option<SocketAddr>) -> SshConnection {
        SshConnection {
            hub: Arc::clone(&self.hub),
            peer_addr,
            identity: None,
            to_session: None,
        }
    }
}

struct SshConnection {
    hub: Arc<Hub>,
    peer_addr: Option<SocketAddr>,
    identity: Option<SshIdentity>,
    /// Write half of the pipe feeding inbound channel data to the session.
    to_session: Option<tokio::io::WriteHalf<DuplexStream>>,
}

impl russh::server::Handler for SshConnection {
    type Error = anyhow::Error;

    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        // Ownership of the key was proven by the signature check; identity
        // resolution (known fingerprint, auto-registration) happens in the
        // session layer where repository access lives.
        self.identity = Some(SshIdentity {
            username: user.to_string(),
            fingerprint: public_key.fingerprint(HashAlg::Sha256).to_string(),
            key_type: public_key.algorithm().to_string(),
        });
        Ok(Auth::Accept)
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        session: &mut Session,
    ) -> Result<bool, Self::Error> {
        let Some(identity) = self.identity.clone() else {
            return Ok(false);
        };
        let Some(addr) = self.peer_addr else {
            return Ok(false);
        };

        let (session_end, handler_end) = tokio::io::duplex(PIPE_CAPACITY);
        let (mut from_session, to_session) = tokio::io::split(handler_end);
        self.to_session = Some(to_session);

        // Pump session-originated bytes back out over the SSH channel.
        let handle = session.handle();
        let channel_id = channel.id();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 16 * 1024];
            loop {
                match from_session.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        let payload: bytes::Bytes = buf[..n].to_vec().into();
                        if handle.data(channel_id, payload).await.is_err() {
                            break;
                        }
                    }
                }
            }
            let _ = handle.close(channel_id).await;
        });

        let hub = Arc::clone(&self.hub);
        if !hub.acquire_connection_slot(addr.ip()) {
            warn!(%addr, "SSH connection refused: per-IP cap reached");
            return Ok(false);
        }
        tokio::spawn(async move {
            let transport = FramedTransport::ssh(session_end);
            run_session(hub, transport, addr, Some(identity)).await;
        });
        debug!(%addr, "SSH channel bridged into session loop");
        Ok(true)
    }

    async fn data(
        &mut self,
        _channel: ChannelId,
        data: &[u8],
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if let Some(pipe) = self.to_session.as_mut() {
            pipe.write_all(data).await?;
        }
        Ok(())
    }

    async fn channel_eof(
        &mut self,
        _channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if let Some(mut pipe) = self.to_session.take() {
            let _ = pipe.shutdown().await;
        }
        Ok(())
    }

    async fn channel_close(
        &mut self,
        _channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if let Some(mut pipe) = self.to_session.take() {
            let _ = pipe.shutdown().await;
        }
        Ok(())
    }
}
