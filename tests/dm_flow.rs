//! DM key negotiation and opaque encrypted passthrough.

mod common;

use std::time::Duration;

use common::TestServer;
use superchat_proto::dm::generate_keypair;
use superchat_proto::frame::FLAG_ENCRYPTED;
use superchat_proto::messages::{
    key_type, AllowUnencrypted, DmTarget, Message, PostMessage, ProvidePublicKey, StartDm,
};

/// S4: full key-required negotiation ending in an encrypted-capable DM.
#[tokio::test]
async fn key_negotiation_flow() {
    let server = TestServer::spawn().await.unwrap();

    let mut bob = server.connect().await.unwrap();
    bob.register("bob", [1u8; 32]).await.unwrap();

    let mut alice = server.connect().await.unwrap();
    alice.set_nickname("alice").await.unwrap();

    // Alice has no key and will not accept unencrypted: KEY_REQUIRED.
    alice
        .send(&Message::StartDm(StartDm {
            target: DmTarget::Nickname("bob".into()),
            allow_unencrypted: false,
        }))
        .await
        .unwrap();
    let invite_id = alice
        .expect(|msg| match msg {
            Message::KeyRequired(k) => Some(k.invite_id),
            _ => None,
        })
        .await
        .unwrap();

    // Alice provides PA; bob is asked next while alice waits.
    let alice_keys = generate_keypair();
    alice
        .send(&Message::ProvidePublicKey(ProvidePublicKey {
            invite_id: Some(invite_id),
            key_type: key_type::GENERATED,
            public_key: alice_keys.public,
        }))
        .await
        .unwrap();

    let request = bob
        .expect(|msg| match msg {
            Message::DmRequest(r) => Some(r),
            _ => None,
        })
        .await
        .unwrap();
    assert_eq!(request.invite_id, invite_id);
    assert_eq!(request.from_nickname, "~alice");
    bob.expect(|msg| match msg {
        Message::KeyRequired(k) if k.invite_id == invite_id => Some(()),
        _ => None,
    })
    .await
    .unwrap();

    alice
        .expect(|msg| match msg {
            Message::DmPending(p) if p.invite_id == invite_id => Some(()),
            _ => None,
        })
        .await
        .unwrap();

    // Bob answers with PB; both sides get DM_READY with the peer's key.
    let bob_keys = generate_keypair();
    bob.send(&Message::ProvidePublicKey(ProvidePublicKey {
        invite_id: Some(invite_id),
        key_type: key_type::GENERATED,
        public_key: bob_keys.public,
    }))
    .await
    .unwrap();

    let ready_alice = alice
        .expect(|msg| match msg {
            Message::DmReady(r) if r.invite_id == invite_id => Some(r),
            _ => None,
        })
        .await
        .unwrap();
    let ready_bob = bob
        .expect(|msg| match msg {
            Message::DmReady(r) if r.invite_id == invite_id => Some(r),
            _ => None,
        })
        .await
        .unwrap();
    assert_eq!(ready_alice.channel_id, ready_bob.channel_id);
    assert_eq!(ready_alice.peer_public_key, Some(bob_keys.public));
    assert_eq!(ready_bob.peer_public_key, Some(alice_keys.public));

    // Both sides can now derive the same shared secret off the wire data.
    assert_eq!(
        alice_keys.shared_secret(&ready_alice.peer_public_key.unwrap()),
        bob_keys.shared_secret(&ready_bob.peer_public_key.unwrap()),
    );

    // Encrypted frame: ciphertext relayed verbatim, flag preserved.
    let dm_channel = ready_alice.channel_id;
    let ciphertext: Vec<u8> = (0..200u8).collect();
    let mut frame = Message::PostMessage(PostMessage {
        channel_id: dm_channel,
        subchannel_id: None,
        parent_id: None,
        content: ciphertext.clone(),
    })
    .to_frame();
    frame.flags |= FLAG_ENCRYPTED;
    alice.send_frame(frame).await.unwrap();

    alice
        .expect(|msg| match msg {
            Message::MessagePosted(p) if p.success => Some(()),
            _ => None,
        })
        .await
        .unwrap();

    let event_frame = loop {
        let frame = bob.recv_frame().await.unwrap();
        if let Ok(Message::NewMessage(_)) = frame.message() {
            break frame;
        }
    };
    assert!(event_frame.is_encrypted(), "encrypted flag must survive fan-out");
    let Ok(Message::NewMessage(event)) = event_frame.message() else {
        panic!("expected NEW_MESSAGE");
    };
    assert_eq!(event.message.content, ciphertext);
    assert!(event.message.encrypted);
}

/// Both sides consenting to unencrypted DMs skips key exchange.
#[tokio::test]
async fn unencrypted_consent_flow() {
    let server = TestServer::spawn().await.unwrap();

    let mut bob = server.connect().await.unwrap();
    bob.set_nickname("bob").await.unwrap();

    let mut alice = server.connect().await.unwrap();
    alice.set_nickname("alice").await.unwrap();

    alice
        .send(&Message::StartDm(StartDm {
            target: DmTarget::Nickname("bob".into()),
            allow_unencrypted: true,
        }))
        .await
        .unwrap();

    let invite_id = bob
        .expect(|msg| match msg {
            Message::DmRequest(r) => Some(r.invite_id),
            _ => None,
        })
        .await
        .unwrap();

    bob.send(&Message::AllowUnencrypted(AllowUnencrypted {
        invite_id: Some(invite_id),
        permanent: false,
    }))
    .await
    .unwrap();

    let ready = alice
        .expect(|msg| match msg {
            Message::DmReady(r) => Some(r),
            _ => None,
        })
        .await
        .unwrap();
    assert_eq!(ready.peer_public_key, None, "unencrypted DMs exchange no keys");

    bob.expect(|msg| match msg {
        Message::DmReady(r) if r.peer_public_key.is_none() => Some(()),
        _ => None,
    })
    .await
    .unwrap();

    // Plain posts flow through the ordinary path.
    alice.post(ready.channel_id, None, "hello in the clear").await.unwrap();
    let event = bob.expect_new_message().await.unwrap();
    assert_eq!(event.content, b"hello in the clear");
}

/// Encryption flag on a public channel is a validation error.
#[tokio::test]
async fn encrypted_flag_rejected_outside_dm() {
    let server = TestServer::spawn().await.unwrap();

    let mut alice = server.connect().await.unwrap();
    alice.set_nickname("alice").await.unwrap();
    let channel = alice.create_channel("public").await.unwrap();
    alice.join_channel(channel).await.unwrap();

    let mut frame = Message::PostMessage(PostMessage {
        channel_id: channel,
        subchannel_id: None,
        parent_id: None,
        content: vec![1, 2, 3],
    })
    .to_frame();
    frame.flags |= FLAG_ENCRYPTED;
    alice.send_frame(frame).await.unwrap();

    let err = alice
        .expect(|msg| match msg {
            Message::Error(e) => Some(e),
            _ => None,
        })
        .await
        .unwrap();
    assert_eq!(err.code, 6000);
}

/// Target disconnect before ready abandons the invite silently.
#[tokio::test]
async fn target_disconnect_abandons_invite() {
    let server = TestServer::spawn().await.unwrap();

    let mut bob = server.connect().await.unwrap();
    bob.set_nickname("bob").await.unwrap();

    let mut alice = server.connect().await.unwrap();
    alice.set_nickname("alice").await.unwrap();
    alice
        .send(&Message::StartDm(StartDm {
            target: DmTarget::Nickname("bob".into()),
            allow_unencrypted: true,
        }))
        .await
        .unwrap();
    bob.expect(|msg| match msg {
        Message::DmRequest(_) => Some(()),
        _ => None,
    })
    .await
    .unwrap();
    drop(bob);

    // No channel existed: no DM_PARTICIPANT_LEFT, just silence.
    alice
        .assert_silent(Duration::from_millis(400), |msg| match msg {
            Message::DmParticipantLeft(p) => Some(p.channel_id),
            Message::DmReady(r) => Some(r.channel_id),
            _ => None,
        })
        .await
        .unwrap();
}
