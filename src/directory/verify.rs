//! Registration verification over a back-connection.
//!
//! The directory dials the announced `hostname:port` as an ordinary client,
//! sends VERIFY_REGISTRATION with a fresh 64-bit nonce, and requires a
//! VERIFY_RESPONSE echoing it within the hard deadline. Any other inbound
//! frame (SERVER_CONFIG arrives first) is skipped.

use std::time::Duration;

use anyhow::{bail, Context};
use futures_util::{SinkExt, StreamExt};
use superchat_proto::messages::{Message, VerifyRegistration};
use superchat_proto::FrameCodec;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::debug;

/// Hard deadline for the whole verification round trip.
pub const VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Dial `hostname:port` and run the challenge. `Ok(())` means the peer
/// answered with the right nonce inside the deadline.
pub async fn verify_server(hostname: &str, port: u16) -> anyhow::Result<()> {
    tokio::time::timeout(VERIFY_TIMEOUT, run_challenge(hostname, port))
        .await
        .map_err(|_| anyhow::anyhow!("verification timed out"))?
}

async fn run_challenge(hostname: &str, port: u16) -> anyhow::Result<()> {
    let stream = TcpStream::connect((hostname, port))
        .await
        .with_context(|| format!("connecting to {hostname}:{port}"))?;
    let mut framed = Framed::new(stream, FrameCodec::new());

    let challenge: u64 = rand::random();
    framed
        .send(Message::VerifyRegistration(VerifyRegistration { challenge }).to_frame())
        .await
        .context("sending challenge")?;
    debug!(%hostname, port, "Verification challenge sent");

    while let Some(frame) = framed.next().await {
        let frame = frame.context("reading verification response")?;
        match frame.message() {
            Ok(Message::VerifyResponse(resp)) => {
                if resp.challenge == challenge {
                    return Ok(());
                }
                bail!("challenge mismatch");
            }
            // SERVER_CONFIG and other greeting frames are expected noise.
            Ok(_) => continue,
            Err(e) => bail!("undecodable frame during verification: {e}"),
        }
    }
    bail!("connection closed before verification response")
}
