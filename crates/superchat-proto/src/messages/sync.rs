//! Subscription and read-state payloads.

use bytes::{BufMut, Bytes, BytesMut};

use super::{UnreadEntry, Wire};
use crate::error::WireError;
use crate::wire::*;

/// Subscription target kind carried by SUBSCRIBE_OK.
pub mod subscribe_target {
    /// A thread subscription.
    pub const THREAD: u8 = 1;
    /// A channel subscription.
    pub const CHANNEL: u8 = 2;
}

/// SUBSCRIBE_THREAD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscribeThread {
    /// Channel the thread lives in.
    pub channel_id: u64,
    /// Root message of the thread.
    pub thread_root_id: u64,
}

impl Wire for SubscribeThread {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.channel_id);
        buf.put_u64(self.thread_root_id);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            channel_id: get_u64(buf)?,
            thread_root_id: get_u64(buf)?,
        })
    }
}

/// UNSUBSCRIBE_THREAD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsubscribeThread {
    /// Root message of the thread.
    pub thread_root_id: u64,
}

impl Wire for UnsubscribeThread {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.thread_root_id);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            thread_root_id: get_u64(buf)?,
        })
    }
}

/// SUBSCRIBE_CHANNEL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeChannel {
    /// Channel to subscribe to.
    pub channel_id: u64,
    /// Subchannel scope, if any.
    pub subchannel_id: Option<u64>,
}

impl Wire for SubscribeChannel {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.channel_id);
        put_opt_u64(buf, self.subchannel_id);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            channel_id: get_u64(buf)?,
            subchannel_id: get_opt_u64(buf)?,
        })
    }
}

/// UNSUBSCRIBE_CHANNEL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsubscribeChannel {
    /// Channel to unsubscribe from.
    pub channel_id: u64,
}

impl Wire for UnsubscribeChannel {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.channel_id);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            channel_id: get_u64(buf)?,
        })
    }
}

/// SUBSCRIBE_OK: acknowledges subscribe and unsubscribe operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeOk {
    /// [`subscribe_target::THREAD`] or [`subscribe_target::CHANNEL`].
    pub target_type: u8,
    /// The channel or thread-root id.
    pub id: u64,
    /// Subchannel scope echoed back for channel subscriptions.
    pub subchannel_id: Option<u64>,
    /// True after subscribe, false after unsubscribe.
    pub subscribed: bool,
}

impl Wire for SubscribeOk {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.target_type);
        buf.put_u64(self.id);
        put_opt_u64(buf, self.subchannel_id);
        put_bool(buf, self.subscribed);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            target_type: get_u8(buf)?,
            id: get_u64(buf)?,
            subchannel_id: get_opt_u64(buf)?,
            subscribed: get_bool(buf)?,
        })
    }
}

/// GET_UNREAD_COUNTS (registered users only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GetUnreadCounts;

impl Wire for GetUnreadCounts {
    fn encode(&self, _buf: &mut BytesMut) {}

    fn decode(_buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self)
    }
}

/// UNREAD_COUNTS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreadCounts {
    /// One entry per channel/subchannel/thread with unread messages.
    pub counts: Vec<UnreadEntry>,
}

impl Wire for UnreadCounts {
    fn encode(&self, buf: &mut BytesMut) {
        put_list(buf, &self.counts, |b, c| c.encode(b));
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            counts: get_list(buf, UnreadEntry::decode)?,
        })
    }
}

/// UPDATE_READ_STATE (registered users only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReadState {
    /// Channel scope.
    pub channel_id: u64,
    /// Subchannel scope, if any.
    pub subchannel_id: Option<u64>,
    /// Watermark, UNIX ms; messages at or before this are read.
    pub last_read_at: i64,
}

impl Wire for UpdateReadState {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.channel_id);
        put_opt_u64(buf, self.subchannel_id);
        buf.put_i64(self.last_read_at);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            channel_id: get_u64(buf)?,
            subchannel_id: get_opt_u64(buf)?,
            last_read_at: get_i64(buf)?,
        })
    }
}

/// READ_STATE_UPDATED.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadStateUpdated {
    /// Channel scope echoed back.
    pub channel_id: u64,
    /// Subchannel scope echoed back.
    pub subchannel_id: Option<u64>,
    /// Stored watermark.
    pub last_read_at: i64,
}

impl Wire for ReadStateUpdated {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.channel_id);
        put_opt_u64(buf, self.subchannel_id);
        buf.put_i64(self.last_read_at);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            channel_id: get_u64(buf)?,
            subchannel_id: get_opt_u64(buf)?,
            last_read_at: get_i64(buf)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::{round_trip, Message};
    use super::*;

    #[test]
    fn subscription_round_trips() {
        round_trip(Message::SubscribeThread(SubscribeThread {
            channel_id: 1,
            thread_root_id: 10,
        }));
        round_trip(Message::UnsubscribeThread(UnsubscribeThread {
            thread_root_id: 10,
        }));
        round_trip(Message::SubscribeChannel(SubscribeChannel {
            channel_id: 1,
            subchannel_id: None,
        }));
        round_trip(Message::UnsubscribeChannel(UnsubscribeChannel {
            channel_id: 1,
        }));
        round_trip(Message::SubscribeOk(SubscribeOk {
            target_type: subscribe_target::CHANNEL,
            id: 1,
            subchannel_id: None,
            subscribed: true,
        }));
    }

    #[test]
    fn read_state_round_trips() {
        round_trip(Message::GetUnreadCounts(GetUnreadCounts));
        round_trip(Message::UnreadCounts(UnreadCounts {
            counts: vec![UnreadEntry {
                channel_id: 1,
                subchannel_id: None,
                thread_root_id: Some(10),
                count: 4,
            }],
        }));
        round_trip(Message::UpdateReadState(UpdateReadState {
            channel_id: 1,
            subchannel_id: Some(2),
            last_read_at: 1_700_000_000_000,
        }));
        round_trip(Message::ReadStateUpdated(ReadStateUpdated {
            channel_id: 1,
            subchannel_id: Some(2),
            last_read_at: 1_700_000_000_000,
        }));
    }
}
