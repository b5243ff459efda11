//! Directory registration, verification, heartbeats, and chat-only mode.

mod common;

use std::time::Duration;

use common::TestServer;
use superchat_proto::messages::{Heartbeat, ListServers, Message, RegisterServer};
use superchatd::Config;

fn directory_config() -> Config {
    let mut config = TestServer::test_config();
    config.directory.enabled = true;
    config.directory.hostname = Some("127.0.0.1".into());
    config
}

fn registration(port: u16) -> RegisterServer {
    RegisterServer {
        hostname: "127.0.0.1".into(),
        port,
        name: "Announced".into(),
        description: "test server".into(),
        max_users: 50,
        is_public: true,
        channel_count: 3,
        user_count: 4,
        uptime_seconds: 5,
    }
}

/// S5: announce, back-connection challenge, REGISTER_ACK with interval.
#[tokio::test]
async fn register_with_back_connection_verify() {
    let directory = TestServer::spawn_with(directory_config()).await.unwrap();
    // The "announced" server is just another instance; its session layer
    // answers VERIFY_REGISTRATION automatically.
    let announced = TestServer::spawn().await.unwrap();

    let mut announcer = directory.connect().await.unwrap();
    announcer
        .send(&Message::RegisterServer(registration(announced.addr().port())))
        .await
        .unwrap();

    let ack = announcer
        .expect(|msg| match msg {
            Message::RegisterAck(a) => Some(a),
            _ => None,
        })
        .await
        .unwrap();
    assert!(ack.success, "verification should pass: {:?}", ack.message);
    assert_eq!(ack.heartbeat_interval, 300, "load table floor is 300 s");

    // The entry is now served to clients.
    announcer
        .send(&Message::ListServers(ListServers))
        .await
        .unwrap();
    let servers = announcer
        .expect(|msg| match msg {
            Message::ServerList(l) => Some(l.servers),
            _ => None,
        })
        .await
        .unwrap();
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].port, announced.addr().port());

    // Heartbeat refreshes the entry and echoes the interval.
    announcer
        .send(&Message::Heartbeat(Heartbeat {
            hostname: "127.0.0.1".into(),
            port: announced.addr().port(),
            user_count: 9,
            channel_count: 9,
            uptime_seconds: 99,
        }))
        .await
        .unwrap();
    let ack = announcer
        .expect(|msg| match msg {
            Message::HeartbeatAck(a) => Some(a),
            _ => None,
        })
        .await
        .unwrap();
    assert_eq!(ack.heartbeat_interval, 300);
}

/// Unverifiable announcements are rejected with the canonical message.
#[tokio::test]
async fn unreachable_server_is_rejected() {
    let directory = TestServer::spawn_with(directory_config()).await.unwrap();

    let mut announcer = directory.connect().await.unwrap();
    // Grab a port with no listener: bind-then-drop.
    let dead_port = {
        let sock = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        sock.local_addr().unwrap().port()
    };
    announcer
        .send(&Message::RegisterServer(registration(dead_port)))
        .await
        .unwrap();

    let ack = announcer
        .expect(|msg| match msg {
            Message::RegisterAck(a) => Some(a),
            _ => None,
        })
        .await
        .unwrap();
    assert!(!ack.success);
    assert_eq!(ack.message.as_deref(), Some("Could not verify server"));

    announcer
        .send(&Message::ListServers(ListServers))
        .await
        .unwrap();
    let servers = announcer
        .expect(|msg| match msg {
            Message::ServerList(l) => Some(l.servers),
            _ => None,
        })
        .await
        .unwrap();
    assert!(servers.is_empty());
}

/// Chat-only servers ignore REGISTER_SERVER and serve an empty list.
#[tokio::test]
async fn chat_only_mode_ignores_registration() {
    let server = TestServer::spawn().await.unwrap();
    let target = TestServer::spawn().await.unwrap();

    let mut client = server.connect().await.unwrap();
    client
        .send(&Message::RegisterServer(registration(target.addr().port())))
        .await
        .unwrap();

    // Ignored: no ack of any kind.
    client
        .assert_silent(Duration::from_millis(400), |msg| match msg {
            Message::RegisterAck(a) => Some(a.success),
            _ => None,
        })
        .await
        .unwrap();

    client.send(&Message::ListServers(ListServers)).await.unwrap();
    let servers = client
        .expect(|msg| match msg {
            Message::ServerList(l) => Some(l.servers),
            _ => None,
        })
        .await
        .unwrap();
    assert!(servers.is_empty());
}

/// Full startup announcement: server B announces itself to directory A via
/// the config record, surviving A's back-connection challenge.
#[tokio::test]
async fn startup_announce_end_to_end() {
    let directory = TestServer::spawn_with(directory_config()).await.unwrap();

    let mut announced_config = TestServer::test_config();
    announced_config.directory.hostname = Some("127.0.0.1".into());
    // The announced port must be the real bound port; bind it first.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    announced_config.listen.tcp = format!("127.0.0.1:{port}").parse().unwrap();
    announced_config.directory.port = Some(port);
    announced_config.directory.announce = vec![format!("127.0.0.1:{}", directory.addr().port())];
    let _announced = TestServer::spawn_with(announced_config).await.unwrap();

    // Wait for the announce → verify → upsert round trip to land.
    let mut client = directory.connect().await.unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        client.send(&Message::ListServers(ListServers)).await.unwrap();
        let servers = client
            .expect(|msg| match msg {
                Message::ServerList(l) => Some(l.servers),
                _ => None,
            })
            .await
            .unwrap();
        if servers.iter().any(|s| s.port == port) {
            break;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("announced server never appeared in the directory");
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
