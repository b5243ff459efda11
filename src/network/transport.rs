//! One framed-stream interface over TCP, WebSocket, and SSH.
//!
//! TCP and SSH run `FrameCodec` directly over the byte stream (SSH channel
//! data is bridged through an in-process duplex pipe). WebSocket carries
//! exactly one frame per binary message; text and control messages are
//! handled at this layer and never surface to the session.

use bytes::BytesMut;
use futures_util::{SinkExt, StreamExt};
use superchat_proto::{Frame, FrameCodec, FrameError};
use tokio::io::DuplexStream;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;
use tokio_util::codec::Framed;

/// A bidirectional stream of frames, transport-agnostic.
pub enum FramedTransport {
    Tcp(Framed<TcpStream, FrameCodec>),
    WebSocket {
        ws: Box<WebSocketStream<TcpStream>>,
        codec: FrameCodec,
        buf: BytesMut,
    },
    Ssh(Framed<DuplexStream, FrameCodec>),
}

impl FramedTransport {
    pub fn tcp(stream: TcpStream) -> Self {
        Self::Tcp(Framed::new(stream, FrameCodec::new()))
    }

    pub fn websocket(ws: WebSocketStream<TcpStream>) -> Self {
        Self::WebSocket {
            ws: Box::new(ws),
            codec: FrameCodec::new(),
            buf: BytesMut::new(),
        }
    }

    pub fn ssh(pipe: DuplexStream) -> Self {
        Self::Ssh(Framed::new(pipe, FrameCodec::new()))
    }

    /// Read the next frame. `None` means the peer closed cleanly.
    pub async fn next_frame(&mut self) -> Option<Result<Frame, FrameError>> {
        match self {
            Self::Tcp(framed) => framed.next().await,
            Self::Ssh(framed) => framed.next().await,
            Self::WebSocket { ws, codec, buf } => loop {
                // Drain any frame already buffered from a previous message.
                match codec.decode_from(buf) {
                    Ok(Some(frame)) => return Some(Ok(frame)),
                    Ok(None) => {}
                    Err(e) => return Some(Err(e)),
                }
                match ws.next().await? {
                    Ok(WsMessage::Binary(data)) => {
                        buf.extend_from_slice(&data);
                    }
                    Ok(WsMessage::Close(_)) => return None,
                    Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_)) => continue,
                    Ok(WsMessage::Text(_)) => {
                        return Some(Err(FrameError::Malformed(
                            "text message on binary websocket",
                        )));
                    }
                    Err(e) => {
                        return Some(Err(FrameError::Io(std::io::Error::other(e))));
                    }
                }
            },
        }
    }

    /// Write one frame and flush it.
    pub async fn send_frame(&mut self, frame: Frame) -> Result<(), FrameError> {
        match self {
            Self::Tcp(framed) => framed.send(frame).await,
            Self::Ssh(framed) => framed.send(frame).await,
            Self::WebSocket { ws, codec, .. } => {
                let mut out = BytesMut::new();
                codec.encode_into(&frame, &mut out)?;
                ws.send(WsMessage::Binary(out.to_vec()))
                    .await
                    .map_err(|e| FrameError::Io(std::io::Error::other(e)))
            }
        }
    }

    /// Record the peer's advertised protocol version (compression gating).
    pub fn set_peer_version(&mut self, version: u8) {
        match self {
            Self::Tcp(framed) => framed.codec_mut().set_peer_version(version),
            Self::Ssh(framed) => framed.codec_mut().set_peer_version(version),
            Self::WebSocket { codec, .. } => codec.set_peer_version(version),
        }
    }
}
