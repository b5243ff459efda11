//! Broker - process-wide session registry and event fan-out.
//!
//! Holds every live session handle plus three subscription structures:
//!
//! - `channel_subs`: channel id -> sessions receiving channel-root events
//! - `thread_subs`: thread-root id -> sessions receiving that thread's replies
//! - `rosters`: channel id -> sessions currently joined (presence scope)
//!
//! Subscription sets are `im::HashSet` values inside a `DashMap`: mutation
//! replaces the value, enumeration clones a persistent snapshot, so fan-out
//! never iterates a mutating set. Per-channel commit ordering is provided by
//! an async mutex handed to message handlers: persistence commit and fan-out
//! enqueue happen under it, which makes delivery order match commit order
//! for any single channel.
//!
//! Sessions are held by id; connections keep a [`SessionHandle`] clone. The
//! handle's outbound queue is bounded: a full queue marks the session a
//! slow consumer and cancels it rather than blocking the broker.

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use superchat_proto::messages::Message;
use superchat_proto::Frame;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Outbound queue capacity per session; overflow = slow consumer.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 64;

/// Session state visible to the broker during fan-out.
#[derive(Debug)]
pub struct SessionShared {
    pub remote_ip: IpAddr,
    pub connected_at: i64,
    user_id: RwLock<Option<u64>>,
    nickname: RwLock<Option<String>>,
    is_admin: AtomicBool,
}

impl SessionShared {
    pub fn new(remote_ip: IpAddr, connected_at: i64) -> Self {
        Self {
            remote_ip,
            connected_at,
            user_id: RwLock::new(None),
            nickname: RwLock::new(None),
            is_admin: AtomicBool::new(false),
        }
    }

    pub fn user_id(&self) -> Option<u64> {
        *self.user_id.read()
    }

    pub fn nickname(&self) -> Option<String> {
        self.nickname.read().clone()
    }

    pub fn is_admin(&self) -> bool {
        self.is_admin.load(Ordering::Relaxed)
    }

    pub fn set_identity(&self, user_id: Option<u64>, nickname: Option<String>, admin: bool) {
        *self.user_id.write() = user_id;
        *self.nickname.write() = nickname;
        self.is_admin.store(admin, Ordering::Relaxed);
    }

    pub fn set_nickname(&self, nickname: Option<String>) {
        *self.nickname.write() = nickname;
    }
}

/// Cloneable handle to a live session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: u64,
    pub shared: Arc<SessionShared>,
    tx: mpsc::Sender<Frame>,
    cancel: CancellationToken,
    close_reason: Arc<Mutex<Option<String>>>,
}

impl SessionHandle {
    /// Create a handle plus the receiving half of its outbound queue.
    pub fn new(id: u64, shared: Arc<SessionShared>) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let handle = Self {
            id,
            shared,
            tx,
            cancel: CancellationToken::new(),
            close_reason: Arc::new(Mutex::new(None)),
        };
        (handle, rx)
    }

    /// Enqueue a frame. A full queue closes the session ("slow consumer");
    /// sending to a closed session is a no-op.
    pub fn enqueue(&self, frame: Frame) {
        match self.tx.try_send(frame) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(session = self.id, "Outbound queue full - closing slow consumer");
                crate::metrics::SLOW_CONSUMERS.inc();
                self.close("slow consumer");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    /// Enqueue a typed message as an unflagged frame.
    pub fn enqueue_message(&self, msg: &Message) {
        self.enqueue(msg.to_frame());
    }

    /// Request session termination with a DISCONNECT reason.
    /// The first reason wins.
    pub fn close(&self, reason: &str) {
        {
            let mut slot = self.close_reason.lock();
            if slot.is_none() {
                *slot = Some(reason.to_string());
            }
        }
        self.cancel.cancel();
    }

    /// The reason passed to [`close`](Self::close), once set.
    pub fn take_close_reason(&self) -> Option<String> {
        self.close_reason.lock().clone()
    }

    /// Token cancelled when the session must terminate.
    pub fn cancelled(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// The process-wide broker.
#[derive(Default)]
pub struct Broker {
    sessions: DashMap<u64, SessionHandle>,
    channel_subs: DashMap<u64, im::HashSet<u64>>,
    thread_subs: DashMap<u64, im::HashSet<u64>>,
    rosters: DashMap<u64, im::HashSet<u64>>,
    channel_order: DashMap<u64, Arc<tokio::sync::Mutex<()>>>,
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    // -- session registry -------------------------------------------------

    pub fn register(&self, handle: SessionHandle) {
        crate::metrics::CONNECTED_SESSIONS.inc();
        self.sessions.insert(handle.id, handle);
    }

    /// Remove a session from the registry and from every subscription set
    /// it appears in. Called exactly once during teardown, before the
    /// session object is dropped.
    pub fn unregister(&self, session_id: u64) {
        if self.sessions.remove(&session_id).is_some() {
            crate::metrics::CONNECTED_SESSIONS.dec();
        }
        for mut entry in self.channel_subs.iter_mut() {
            if entry.contains(&session_id) {
                entry.remove(&session_id);
            }
        }
        for mut entry in self.thread_subs.iter_mut() {
            if entry.contains(&session_id) {
                entry.remove(&session_id);
            }
        }
        for mut entry in self.rosters.iter_mut() {
            if entry.contains(&session_id) {
                entry.remove(&session_id);
            }
        }
    }

    pub fn session(&self, session_id: u64) -> Option<SessionHandle> {
        self.sessions.get(&session_id).map(|h| h.clone())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Ids of every live session (snapshot).
    pub fn session_ids(&self) -> Vec<u64> {
        self.sessions.iter().map(|h| h.id).collect()
    }

    /// Sessions authenticated as the given user.
    pub fn sessions_of_user(&self, user_id: u64) -> Vec<SessionHandle> {
        self.sessions
            .iter()
            .filter(|h| h.shared.user_id() == Some(user_id))
            .map(|h| h.clone())
            .collect()
    }

    /// Sessions whose display nickname matches (anonymous included).
    pub fn sessions_with_nickname(&self, nickname: &str) -> Vec<SessionHandle> {
        let folded = nickname.to_lowercase();
        self.sessions
            .iter()
            .filter(|h| {
                h.shared
                    .nickname()
                    .is_some_and(|n| n.to_lowercase() == folded)
            })
            .map(|h| h.clone())
            .collect()
    }

    pub fn user_online(&self, user_id: u64) -> bool {
        self.sessions
            .iter()
            .any(|h| h.shared.user_id() == Some(user_id))
    }

    // -- subscriptions ----------------------------------------------------

    pub fn subscribe_channel(&self, channel_id: u64, session_id: u64) {
        self.channel_subs
            .entry(channel_id)
            .or_default()
            .insert(session_id);
    }

    pub fn unsubscribe_channel(&self, channel_id: u64, session_id: u64) {
        if let Some(mut set) = self.channel_subs.get_mut(&channel_id) {
            set.remove(&session_id);
        }
    }

    pub fn subscribe_thread(&self, thread_root_id: u64, session_id: u64) {
        self.thread_subs
            .entry(thread_root_id)
            .or_default()
            .insert(session_id);
    }

    pub fn unsubscribe_thread(&self, thread_root_id: u64, session_id: u64) {
        if let Some(mut set) = self.thread_subs.get_mut(&thread_root_id) {
            set.remove(&session_id);
        }
    }

    pub fn join_roster(&self, channel_id: u64, session_id: u64) {
        self.rosters.entry(channel_id).or_default().insert(session_id);
    }

    pub fn leave_roster(&self, channel_id: u64, session_id: u64) {
        if let Some(mut set) = self.rosters.get_mut(&channel_id) {
            set.remove(&session_id);
        }
    }

    /// Snapshot of the sessions joined to a channel.
    pub fn roster(&self, channel_id: u64) -> im::HashSet<u64> {
        self.rosters
            .get(&channel_id)
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Snapshot of a channel's subscribers.
    pub fn channel_subscribers(&self, channel_id: u64) -> im::HashSet<u64> {
        self.channel_subs
            .get(&channel_id)
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Drop every subscription structure for a deleted channel.
    pub fn remove_channel(&self, channel_id: u64, thread_roots: &[u64]) {
        self.channel_subs.remove(&channel_id);
        self.rosters.remove(&channel_id);
        self.channel_order.remove(&channel_id);
        for root in thread_roots {
            self.thread_subs.remove(root);
        }
    }

    // -- ordering ---------------------------------------------------------

    /// The per-channel commit lock. Handlers hold it across persistence
    /// commit + fan-out enqueue so recipients observe commit order.
    pub fn channel_order(&self, channel_id: u64) -> Arc<tokio::sync::Mutex<()>> {
        self.channel_order
            .entry(channel_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    // -- delivery ---------------------------------------------------------

    pub fn send_to(&self, session_id: u64, frame: Frame) {
        if let Some(handle) = self.sessions.get(&session_id) {
            handle.enqueue(frame);
        }
    }

    pub fn send_message_to(&self, session_id: u64, msg: &Message) {
        self.send_to(session_id, msg.to_frame());
    }

    /// Broadcast to every live session (CHANNEL_CREATED, USER_DELETED, ...).
    pub fn broadcast_all(&self, msg: &Message) {
        let frame = msg.to_frame();
        for handle in self.sessions.iter() {
            handle.enqueue(frame.clone());
        }
    }

    /// Deliver a presence event to the roster of a channel.
    pub fn send_to_roster(&self, channel_id: u64, msg: &Message) {
        let frame = msg.to_frame();
        for session_id in self.roster(channel_id) {
            self.send_to(session_id, frame.clone());
        }
    }

    /// Route a message event to `channel_subs[channel] ∪ thread_subs[root]`,
    /// one copy per recipient. When the author is shadowbanned, only the
    /// author's own session receives the event.
    pub fn fanout_message(
        &self,
        channel_id: u64,
        thread_root_id: Option<u64>,
        author_session: u64,
        author_shadowbanned: bool,
        frame: Frame,
    ) {
        let mut targets = self.channel_subscribers(channel_id);
        if let Some(root) = thread_root_id {
            if let Some(extra) = self.thread_subs.get(&root) {
                targets = targets.union(extra.clone());
            }
        }

        for session_id in targets {
            if author_shadowbanned && session_id != author_session {
                continue;
            }
            crate::metrics::MESSAGES_FANNED_OUT.inc();
            self.send_to(session_id, frame.clone());
        }
        debug!(channel = channel_id, "Fan-out complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use superchat_proto::messages::{Message, Ping};

    fn handle(id: u64) -> (SessionHandle, mpsc::Receiver<Frame>) {
        let shared = Arc::new(SessionShared::new("127.0.0.1".parse().unwrap(), 0));
        SessionHandle::new(id, shared)
    }

    fn ping_frame() -> Frame {
        Message::Ping(Ping { timestamp: 0 }).to_frame()
    }

    #[tokio::test]
    async fn union_fanout_delivers_one_copy() {
        let broker = Broker::new();
        let (h1, mut rx1) = handle(1);
        let (h2, mut rx2) = handle(2);
        broker.register(h1);
        broker.register(h2);

        // Session 1 is both channel- and thread-subscribed.
        broker.subscribe_channel(7, 1);
        broker.subscribe_thread(99, 1);
        broker.subscribe_thread(99, 2);

        broker.fanout_message(7, Some(99), 1, false, ping_frame());

        assert!(rx1.try_recv().is_ok());
        assert!(rx1.try_recv().is_err(), "exactly one copy");
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn shadowban_reaches_only_author() {
        let broker = Broker::new();
        let (h1, mut rx1) = handle(1);
        let (h2, mut rx2) = handle(2);
        broker.register(h1);
        broker.register(h2);
        broker.subscribe_channel(7, 1);
        broker.subscribe_channel(7, 2);

        broker.fanout_message(7, None, 1, true, ping_frame());

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn unregister_sweeps_all_sets() {
        let broker = Broker::new();
        let (h1, _rx1) = handle(1);
        broker.register(h1);
        broker.subscribe_channel(7, 1);
        broker.subscribe_thread(99, 1);
        broker.join_roster(7, 1);

        broker.unregister(1);

        assert!(broker.channel_subscribers(7).is_empty());
        assert!(broker.roster(7).is_empty());
        assert!(broker.session(1).is_none());
    }

    #[tokio::test]
    async fn queue_overflow_closes_session() {
        let broker = Broker::new();
        let (h1, _rx1) = handle(1);
        broker.register(h1.clone());

        for _ in 0..=OUTBOUND_QUEUE_CAPACITY {
            h1.enqueue(ping_frame());
        }

        assert!(h1.cancelled().is_cancelled());
        assert_eq!(h1.take_close_reason().as_deref(), Some("slow consumer"));
    }

    #[tokio::test]
    async fn nickname_lookup_is_case_insensitive() {
        let broker = Broker::new();
        let (h1, _rx1) = handle(1);
        h1.shared.set_identity(None, Some("Alice".into()), false);
        broker.register(h1);
        assert_eq!(broker.sessions_with_nickname("alice").len(), 1);
        assert_eq!(broker.sessions_with_nickname("bob").len(), 0);
    }
}
