//! Framed test client.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context};
use futures_util::{SinkExt, StreamExt};
use superchat_proto::messages::*;
use superchat_proto::{Frame, FrameCodec};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// How many non-matching frames `expect` skips before giving up.
const EXPECT_SCAN_LIMIT: usize = 64;

/// A TCP client speaking the binary protocol.
pub struct TestClient {
    framed: Framed<TcpStream, FrameCodec>,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already-connected stream (tests that speak raw bytes first).
    pub fn from_stream(stream: TcpStream) -> Self {
        Self {
            framed: Framed::new(stream, FrameCodec::new()),
        }
    }

    pub async fn send(&mut self, msg: &Message) -> anyhow::Result<()> {
        self.framed.send(msg.to_frame()).await?;
        Ok(())
    }

    pub async fn send_frame(&mut self, frame: Frame) -> anyhow::Result<()> {
        self.framed.send(frame).await?;
        Ok(())
    }

    /// Next frame, with a timeout. Errors when the server closed.
    pub async fn recv_frame(&mut self) -> anyhow::Result<Frame> {
        let frame = tokio::time::timeout(RECV_TIMEOUT, self.framed.next())
            .await
            .context("timed out waiting for a frame")?;
        match frame {
            Some(Ok(frame)) => Ok(frame),
            Some(Err(e)) => bail!("frame error: {e}"),
            None => bail!("connection closed"),
        }
    }

    pub async fn recv(&mut self) -> anyhow::Result<Message> {
        Ok(self.recv_frame().await?.message()?)
    }

    /// Read frames until `filter` accepts one, skipping unrelated traffic
    /// (presence events, broadcasts).
    pub async fn expect<T>(
        &mut self,
        mut filter: impl FnMut(Message) -> Option<T>,
    ) -> anyhow::Result<T> {
        for _ in 0..EXPECT_SCAN_LIMIT {
            let msg = self.recv().await?;
            if let Some(out) = filter(msg) {
                return Ok(out);
            }
        }
        bail!("no matching frame within {EXPECT_SCAN_LIMIT} frames")
    }

    /// Assert that nothing matching arrives within `window`.
    pub async fn assert_silent<T: std::fmt::Debug>(
        &mut self,
        window: Duration,
        mut filter: impl FnMut(Message) -> Option<T>,
    ) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + window;
        loop {
            let frame = match tokio::time::timeout_at(deadline, self.framed.next()).await {
                Err(_) => return Ok(()),
                Ok(frame) => frame,
            };
            match frame {
                Some(Ok(frame)) => {
                    if let Ok(msg) = frame.message() {
                        if let Some(hit) = filter(msg) {
                            bail!("unexpected frame arrived: {hit:?}");
                        }
                    }
                }
                Some(Err(e)) => bail!("frame error while asserting silence: {e}"),
                None => return Ok(()),
            }
        }
    }

    /// Wait for the connection to be closed by the server, optionally
    /// returning the last DISCONNECT reason observed.
    pub async fn wait_for_close(&mut self) -> anyhow::Result<Option<String>> {
        let mut reason = None;
        loop {
            let next = tokio::time::timeout(RECV_TIMEOUT, self.framed.next())
                .await
                .context("timed out waiting for close")?;
            match next {
                Some(Ok(frame)) => {
                    if let Ok(Message::ServerDisconnect(d)) = frame.message() {
                        reason = Some(d.reason);
                    }
                }
                Some(Err(_)) | None => return Ok(reason),
            }
        }
    }

    // -- protocol conveniences -------------------------------------------

    pub async fn expect_server_config(&mut self) -> anyhow::Result<ServerConfig> {
        self.expect(|msg| match msg {
            Message::ServerConfig(sc) => Some(sc),
            _ => None,
        })
        .await
    }

    pub async fn set_nickname(&mut self, nickname: &str) -> anyhow::Result<NicknameResponse> {
        self.send(&Message::SetNickname(SetNickname {
            nickname: nickname.into(),
        }))
        .await?;
        self.expect(|msg| match msg {
            Message::NicknameResponse(r) => Some(r),
            _ => None,
        })
        .await
    }

    pub async fn register(
        &mut self,
        nickname: &str,
        password_hash: [u8; 32],
    ) -> anyhow::Result<Message> {
        self.send(&Message::RegisterUser(RegisterUser {
            nickname: nickname.into(),
            password_hash,
        }))
        .await?;
        self.expect(|msg| match msg {
            Message::RegisterResponse(_) | Message::Error(_) => Some(msg),
            _ => None,
        })
        .await
    }

    pub async fn auth(
        &mut self,
        nickname: &str,
        password_hash: [u8; 32],
    ) -> anyhow::Result<AuthResponse> {
        self.send(&Message::AuthRequest(AuthRequest {
            nickname: nickname.into(),
            password_hash,
        }))
        .await?;
        self.expect(|msg| match msg {
            Message::AuthResponse(r) => Some(r),
            _ => None,
        })
        .await
    }

    pub async fn create_channel(&mut self, name: &str) -> anyhow::Result<u64> {
        self.send(&Message::CreateChannel(CreateChannel {
            name: name.into(),
            description: String::new(),
            channel_type: 0,
            retention_hours: 0,
        }))
        .await?;
        let created = self
            .expect(|msg| match msg {
                Message::ChannelCreated(c) if c.channel.name == name => Some(c),
                _ => None,
            })
            .await?;
        Ok(created.channel.id)
    }

    pub async fn join_channel(&mut self, channel_id: u64) -> anyhow::Result<JoinResponse> {
        self.send(&Message::JoinChannel(JoinChannel {
            channel_id,
            subchannel_id: None,
        }))
        .await?;
        self.expect(|msg| match msg {
            Message::JoinResponse(r) if r.channel_id == channel_id => Some(r),
            _ => None,
        })
        .await
    }

    pub async fn subscribe_channel(&mut self, channel_id: u64) -> anyhow::Result<SubscribeOk> {
        self.send(&Message::SubscribeChannel(SubscribeChannel {
            channel_id,
            subchannel_id: None,
        }))
        .await?;
        self.expect(|msg| match msg {
            Message::SubscribeOk(ok) if ok.id == channel_id => Some(ok),
            _ => None,
        })
        .await
    }

    /// Post and return (MESSAGE_POSTED ack, message id).
    pub async fn post(
        &mut self,
        channel_id: u64,
        parent_id: Option<u64>,
        content: &str,
    ) -> anyhow::Result<u64> {
        self.send(&Message::PostMessage(PostMessage {
            channel_id,
            subchannel_id: None,
            parent_id,
            content: content.as_bytes().to_vec(),
        }))
        .await?;
        let posted = self
            .expect(|msg| match msg {
                Message::MessagePosted(p) => Some(p),
                _ => None,
            })
            .await?;
        anyhow::ensure!(posted.success, "post rejected: {:?}", posted.message);
        posted
            .message_id
            .ok_or_else(|| anyhow::anyhow!("MESSAGE_POSTED without id"))
    }

    pub async fn expect_new_message(&mut self) -> anyhow::Result<MessageInfo> {
        self.expect(|msg| match msg {
            Message::NewMessage(n) => Some(n.message),
            _ => None,
        })
        .await
    }

    pub async fn list_messages(
        &mut self,
        channel_id: u64,
        parent_id: Option<u64>,
    ) -> anyhow::Result<Vec<MessageInfo>> {
        self.send(&Message::ListMessages(ListMessages {
            channel_id,
            subchannel_id: None,
            parent_id,
            before_id: None,
            after_id: None,
            limit: 200,
        }))
        .await?;
        self.expect(|msg| match msg {
            Message::MessageList(list) if list.channel_id == channel_id => Some(list.messages),
            _ => None,
        })
        .await
    }

    pub async fn ping(&mut self) -> anyhow::Result<()> {
        self.send(&Message::Ping(Ping { timestamp: 1 })).await?;
        self.expect(|msg| match msg {
            Message::Pong(_) => Some(()),
            _ => None,
        })
        .await
    }
}
