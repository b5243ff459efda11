//! Connection lifecycle: greeting, nickname gates, keepalive, frame caps.

mod common;

use std::time::Duration;

use common::TestServer;
use superchat_proto::messages::Message;
use superchat_proto::PROTOCOL_VERSION;
use tokio::io::AsyncWriteExt;

/// S1: anonymous connect, nickname, join, post, fan-out with `~` sigil.
#[tokio::test]
async fn anonymous_post_flow() {
    let server = TestServer::spawn().await.unwrap();

    let mut alice = server.connect().await.unwrap();
    let config = {
        // Greeting was already consumed by connect(); check the version on
        // a fresh connection instead.
        let mut probe = common::TestClient::connect(server.addr()).await.unwrap();
        probe.expect_server_config().await.unwrap()
    };
    assert_eq!(config.protocol_version, 1);

    let resp = alice.set_nickname("alice").await.unwrap();
    assert!(resp.success);

    let channel = alice.create_channel("general").await.unwrap();
    // Subscribe so the fan-out reaches the author too.
    alice.subscribe_channel(channel).await.unwrap();
    let join = alice.join_channel(channel).await.unwrap();
    assert!(join.success);

    let id = alice.post(channel, None, "hi").await.unwrap();
    let event = alice.expect_new_message().await.unwrap();
    assert_eq!(event.id, id);
    assert_eq!(event.author_nickname, "~alice");
    assert_eq!(event.author_user_id, None);
    assert_eq!(event.content, b"hi");
}

/// S2: a registered nickname cannot be claimed anonymously, but AUTH works.
#[tokio::test]
async fn registered_nickname_gate() {
    let server = TestServer::spawn().await.unwrap();
    let hash = [7u8; 32];

    let mut bob = server.connect().await.unwrap();
    let registered = bob.register("bob", hash).await.unwrap();
    assert!(matches!(
        registered,
        Message::RegisterResponse(ref r) if r.success
    ));
    drop(bob);

    let mut impostor = server.connect().await.unwrap();
    let resp = impostor.set_nickname("bob").await.unwrap();
    assert!(!resp.success);
    assert_eq!(
        resp.message.as_deref(),
        Some("Nickname registered, password required")
    );

    let auth = impostor.auth("bob", hash).await.unwrap();
    assert!(auth.success);
    assert_eq!(auth.nickname.as_deref(), Some("bob"));
    assert!(auth.user_id.is_some());
}

#[tokio::test]
async fn wrong_password_fails_and_locks_after_five() {
    let mut config = TestServer::test_config();
    config.timeouts.idle_timeout_secs = 120;
    let server = TestServer::spawn_with(config).await.unwrap();

    let mut bob = server.connect().await.unwrap();
    bob.register("bob", [1u8; 32]).await.unwrap();
    drop(bob);

    let mut attacker = server.connect().await.unwrap();
    // Five failures (with growing backoff server-side).
    for _ in 0..5 {
        let resp = attacker.auth("bob", [2u8; 32]).await.unwrap();
        assert!(!resp.success);
    }
    // Sixth attempt is refused outright: locked to anonymous.
    attacker
        .send(&Message::AuthRequest(superchat_proto::messages::AuthRequest {
            nickname: "bob".into(),
            password_hash: [1u8; 32],
        }))
        .await
        .unwrap();
    let err = attacker
        .expect(|msg| match msg {
            Message::Error(e) => Some(e),
            _ => None,
        })
        .await
        .unwrap();
    assert_eq!(err.code, 2001);
}

/// Idle sessions are closed with "Session timeout"; PING keeps them alive,
/// and nothing else advances the idle timer.
#[tokio::test]
async fn ping_keepalive_and_idle_timeout() {
    let mut config = TestServer::test_config();
    config.timeouts.idle_timeout_secs = 2;
    let server = TestServer::spawn_with(config).await.unwrap();

    // Pinging session stays up past the timeout.
    let mut alive = server.connect().await.unwrap();
    for _ in 0..4 {
        tokio::time::sleep(Duration::from_millis(700)).await;
        alive.ping().await.unwrap();
    }

    // A session sending non-PING traffic still times out: the idle timer
    // is advanced only by PING.
    let mut busy = server.connect().await.unwrap();
    let closed = tokio::time::timeout(Duration::from_secs(6), async {
        loop {
            tokio::time::sleep(Duration::from_millis(400)).await;
            if busy.set_nickname("busybody").await.is_err() {
                break;
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "non-PING traffic must not defeat the idle timeout");

    let mut idle = server.connect().await.unwrap();
    let reason = idle.wait_for_close().await.unwrap();
    assert_eq!(reason.as_deref(), Some("Session timeout"));
}

/// Property 2: oversized length prefix is rejected without buffering.
#[tokio::test]
async fn oversized_frame_closes_connection() {
    let server = TestServer::spawn().await.unwrap();

    let mut raw = tokio::net::TcpStream::connect(server.addr()).await.unwrap();
    // length = 2 MiB, then nothing; the server must reject on the length
    // word alone rather than wait for a body.
    raw.write_all(&(2_097_152u32).to_be_bytes()).await.unwrap();
    raw.flush().await.unwrap();

    let mut client = common::TestClient::from_stream(raw);
    let closed = tokio::time::timeout(Duration::from_secs(3), client.wait_for_close()).await;
    assert!(closed.is_ok(), "server did not close after oversized frame");
}

/// Version gate: ERROR 1001 and the connection stays open.
#[tokio::test]
async fn newer_version_reports_1001_and_stays_open() {
    let server = TestServer::spawn().await.unwrap();
    let mut client = server.connect().await.unwrap();

    let mut frame = Message::Ping(superchat_proto::messages::Ping { timestamp: 5 }).to_frame();
    frame.version = PROTOCOL_VERSION + 1;
    client.send_frame(frame).await.unwrap();

    let err = client
        .expect(|msg| match msg {
            Message::Error(e) => Some(e),
            _ => None,
        })
        .await
        .unwrap();
    assert_eq!(err.code, 1001);

    // Still usable at the supported version.
    client.ping().await.unwrap();
}

/// Graceful shutdown says goodbye to every session.
#[tokio::test]
async fn shutdown_disconnects_sessions() {
    let mut config = TestServer::test_config();
    config.timeouts.shutdown_grace_secs = 1;
    let server = TestServer::spawn_with(config).await.unwrap();
    let mut client = server.connect().await.unwrap();

    let hub = std::sync::Arc::clone(&server.server.hub);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        hub.shutdown();
    });

    let reason = client.wait_for_close().await.unwrap();
    assert_eq!(reason.as_deref(), Some("Server shutting down"));
}
