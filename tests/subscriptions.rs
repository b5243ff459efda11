//! Subscription fan-out, union delivery, and per-channel ordering.

mod common;

use std::time::Duration;

use common::TestServer;
use superchat_proto::messages::{Message, SubscribeThread};

/// S3: subscribe, receive, unsubscribe, silence.
#[tokio::test]
async fn subscribe_and_unsubscribe_channel() {
    let server = TestServer::spawn().await.unwrap();

    let mut a = server.connect().await.unwrap();
    a.set_nickname("alice").await.unwrap();
    let channel = a.create_channel("general").await.unwrap();
    a.join_channel(channel).await.unwrap();

    let mut b = server.connect().await.unwrap();
    b.set_nickname("bob").await.unwrap();
    let ok = b.subscribe_channel(channel).await.unwrap();
    assert_eq!(ok.target_type, 2);
    assert_eq!(ok.id, channel);
    assert!(ok.subscribed);

    a.post(channel, None, "first").await.unwrap();
    let event = b.expect_new_message().await.unwrap();
    assert_eq!(event.content, b"first");

    b.send(&Message::UnsubscribeChannel(
        superchat_proto::messages::UnsubscribeChannel { channel_id: channel },
    ))
    .await
    .unwrap();
    b.expect(|msg| match msg {
        Message::SubscribeOk(ok) if !ok.subscribed => Some(()),
        _ => None,
    })
    .await
    .unwrap();

    a.post(channel, None, "second").await.unwrap();
    b.assert_silent(Duration::from_millis(300), |msg| match msg {
        Message::NewMessage(n) => Some(n.message.id),
        _ => None,
    })
    .await
    .unwrap();
}

/// Property 5: channel ∪ thread subscribers each get exactly one copy.
#[tokio::test]
async fn thread_reply_fanout_is_set_union() {
    let server = TestServer::spawn().await.unwrap();

    let mut author = server.connect().await.unwrap();
    author.set_nickname("author").await.unwrap();
    let channel = author.create_channel("forum").await.unwrap();
    author.join_channel(channel).await.unwrap();
    let root = author.post(channel, None, "thread root").await.unwrap();

    // channel_only: channel-subscribed only.
    let mut channel_only = server.connect().await.unwrap();
    channel_only.set_nickname("chan").await.unwrap();
    channel_only.subscribe_channel(channel).await.unwrap();

    // both: channel- AND thread-subscribed; must still get one copy.
    let mut both = server.connect().await.unwrap();
    both.set_nickname("both").await.unwrap();
    both.subscribe_channel(channel).await.unwrap();
    both.send(&Message::SubscribeThread(SubscribeThread {
        channel_id: channel,
        thread_root_id: root,
    }))
    .await
    .unwrap();
    both.expect(|msg| match msg {
        Message::SubscribeOk(ok) if ok.target_type == 1 && ok.id == root => Some(()),
        _ => None,
    })
    .await
    .unwrap();

    // thread_only: thread-subscribed only.
    let mut thread_only = server.connect().await.unwrap();
    thread_only.set_nickname("thread").await.unwrap();
    thread_only
        .send(&Message::SubscribeThread(SubscribeThread {
            channel_id: channel,
            thread_root_id: root,
        }))
        .await
        .unwrap();
    thread_only
        .expect(|msg| match msg {
            Message::SubscribeOk(ok) if ok.target_type == 1 => Some(()),
            _ => None,
        })
        .await
        .unwrap();

    let reply = author.post(channel, Some(root), "reply").await.unwrap();

    for client in [&mut channel_only, &mut both, &mut thread_only] {
        let event = client.expect_new_message().await.unwrap();
        assert_eq!(event.id, reply);
        assert_eq!(event.thread_root_id, root);
        assert_eq!(event.thread_depth, 1);
        // Exactly one copy.
        client
            .assert_silent(Duration::from_millis(200), |msg| match msg {
                Message::NewMessage(n) if n.message.id == reply => Some(n.message.id),
                _ => None,
            })
            .await
            .unwrap();
    }
}

/// Property 7: two posts committed in order arrive in order at every
/// common recipient.
#[tokio::test]
async fn per_channel_ordering() {
    let server = TestServer::spawn().await.unwrap();

    let mut author = server.connect().await.unwrap();
    author.set_nickname("author").await.unwrap();
    let channel = author.create_channel("ordered").await.unwrap();
    author.join_channel(channel).await.unwrap();

    let mut watcher = server.connect().await.unwrap();
    watcher.set_nickname("watch").await.unwrap();
    watcher.subscribe_channel(channel).await.unwrap();

    let mut ids = Vec::new();
    for i in 0..20 {
        ids.push(author.post(channel, None, &format!("m{i}")).await.unwrap());
    }

    let mut seen = Vec::new();
    for _ in 0..ids.len() {
        seen.push(watcher.expect_new_message().await.unwrap().id);
    }
    assert_eq!(seen, ids, "delivery order must match commit order");
}

/// Subscription caps surface ERROR 5003.
#[tokio::test]
async fn channel_subscription_cap() {
    let mut config = TestServer::test_config();
    config.limits.max_channel_subs = 2;
    let server = TestServer::spawn_with(config).await.unwrap();

    let mut admin = server.connect().await.unwrap();
    admin.set_nickname("builder").await.unwrap();
    let c1 = admin.create_channel("one").await.unwrap();
    let c2 = admin.create_channel("two").await.unwrap();
    let c3 = admin.create_channel("three").await.unwrap();

    let mut client = server.connect().await.unwrap();
    client.set_nickname("subber").await.unwrap();
    client.subscribe_channel(c1).await.unwrap();
    client.subscribe_channel(c2).await.unwrap();

    client
        .send(&Message::SubscribeChannel(
            superchat_proto::messages::SubscribeChannel {
                channel_id: c3,
                subchannel_id: None,
            },
        ))
        .await
        .unwrap();
    let err = client
        .expect(|msg| match msg {
            Message::Error(e) => Some(e),
            _ => None,
        })
        .await
        .unwrap();
    assert_eq!(err.code, 5003);
}
