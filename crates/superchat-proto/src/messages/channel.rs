//! Channel and subchannel payloads.

use bytes::{BufMut, Bytes, BytesMut};

use super::{ChannelInfo, SubchannelInfo, Wire};
use crate::error::WireError;
use crate::wire::*;

/// LIST_CHANNELS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListChannels;

impl Wire for ListChannels {
    fn encode(&self, _buf: &mut BytesMut) {}

    fn decode(_buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self)
    }
}

/// CHANNEL_LIST. DM channels are never included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelList {
    /// Public channels.
    pub channels: Vec<ChannelInfo>,
}

impl Wire for ChannelList {
    fn encode(&self, buf: &mut BytesMut) {
        put_list(buf, &self.channels, |b, c| c.encode(b));
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            channels: get_list(buf, ChannelInfo::decode)?,
        })
    }
}

/// JOIN_CHANNEL: become part of the channel roster and set the active channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinChannel {
    /// Channel to join.
    pub channel_id: u64,
    /// Optional subchannel focus.
    pub subchannel_id: Option<u64>,
}

impl Wire for JoinChannel {
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

/// JOIN_RESPONSE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinResponse {
    /// Whether the join succeeded.
    pub success: bool,
    /// The channel joined.
    pub channel_id: u64,
    /// The subchannel focused, if requested.
    pub subchannel_id: Option<u64>,
    /// Failure detail.
    pub message: Option<String>,
}

impl Wire for JoinResponse {
    fn encode(&self, buf: &mut BytesMut) {
        put_bool(buf, self.success);
        buf.put_u64(self.channel_id);
        put_opt_u64(buf, self.subchannel_id);
        put_opt_string(buf, &self.message);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            success: get_bool(buf)?,
            channel_id: get_u64(buf)?,
            subchannel_id: get_opt_u64(buf)?,
            message: get_opt_string(buf)?,
        })
    }
}

/// LEAVE_CHANNEL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaveChannel {
    /// Channel to leave.
    pub channel_id: u64,
}

impl Wire for LeaveChannel {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.channel_id);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            channel_id: get_u64(buf)?,
        })
    }
}

/// LEAVE_RESPONSE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaveResponse {
    /// Whether the session was in the channel.
    pub success: bool,
    /// The channel left.
    pub channel_id: u64,
}

impl Wire for LeaveResponse {
    fn encode(&self, buf: &mut BytesMut) {
        put_bool(buf, self.success);
        buf.put_u64(self.channel_id);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            success: get_bool(buf)?,
            channel_id: get_u64(buf)?,
        })
    }
}

/// CREATE_CHANNEL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateChannel {
    /// Unique channel name.
    pub name: String,
    /// Description.
    pub description: String,
    /// 0 = chat, 1 = forum.
    pub channel_type: u8,
    /// Retention window in hours; 0 = keep forever.
    pub retention_hours: u32,
}

impl Wire for CreateChannel {
    fn encode(&self, buf: &mut BytesMut) {
        put_string(buf, &self.name);
        put_string(buf, &self.description);
        buf.put_u8(self.channel_type);
        buf.put_u32(self.retention_hours);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            name: get_string(buf)?,
            description: get_string(buf)?,
            channel_type: get_u8(buf)?,
            retention_hours: get_u32(buf)?,
        })
    }
}

/// CHANNEL_CREATED: response to the creator and broadcast to all sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelCreated {
    /// The new channel.
    pub channel: ChannelInfo,
}

impl Wire for ChannelCreated {
    fn encode(&self, buf: &mut BytesMut) {
        self.channel.encode(buf);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            channel: ChannelInfo::decode(buf)?,
        })
    }
}

/// CREATE_SUBCHANNEL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSubchannel {
    /// Parent channel.
    pub channel_id: u64,
    /// Name, unique within the parent.
    pub name: String,
    /// Description.
    pub description: String,
    /// 0 = chat, 1 = forum.
    pub channel_type: u8,
    /// Retention window in hours; 0 = keep forever.
    pub retention_hours: u32,
}

impl Wire for CreateSubchannel {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.channel_id);
        put_string(buf, &self.name);
        put_string(buf, &self.description);
        buf.put_u8(self.channel_type);
        buf.put_u32(self.retention_hours);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            channel_id: get_u64(buf)?,
            name: get_string(buf)?,
            description: get_string(buf)?,
            channel_type: get_u8(buf)?,
            retention_hours: get_u32(buf)?,
        })
    }
}

/// SUBCHANNEL_CREATED: response to the creator and broadcast to all sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubchannelCreated {
    /// The new subchannel.
    pub subchannel: SubchannelInfo,
}

impl Wire for SubchannelCreated {
    fn encode(&self, buf: &mut BytesMut) {
        self.subchannel.encode(buf);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            subchannel: SubchannelInfo::decode(buf)?,
        })
    }
}

/// GET_SUBCHANNELS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetSubchannels {
    /// Parent channel.
    pub channel_id: u64,
}

impl Wire for GetSubchannels {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.channel_id);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            channel_id: get_u64(buf)?,
        })
    }
}

/// SUBCHANNEL_LIST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubchannelList {
    /// Parent channel.
    pub channel_id: u64,
    /// Its subchannels.
    pub subchannels: Vec<SubchannelInfo>,
}

impl Wire for SubchannelList {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.channel_id);
        put_list(buf, &self.subchannels, |b, s| s.encode(b));
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            channel_id: get_u64(buf)?,
            subchannels: get_list(buf, SubchannelInfo::decode)?,
        })
    }
}

/// LIST_CHANNEL_USERS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListChannelUsers {
    /// Channel whose roster to list.
    pub channel_id: u64,
}

impl Wire for ListChannelUsers {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.channel_id);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            channel_id: get_u64(buf)?,
        })
    }
}

/// CHANNEL_USER_LIST: display names of sessions joined to a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelUserList {
    /// The channel.
    pub channel_id: u64,
    /// Display names of joined sessions.
    pub nicknames: Vec<String>,
}

impl Wire for ChannelUserList {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.channel_id);
        put_list(buf, &self.nicknames, |b, s| put_string(b, s));
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            channel_id: get_u64(buf)?,
            nicknames: get_list(buf, get_string)?,
        })
    }
}

/// DELETE_CHANNEL (admin).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteChannel {
    /// Channel to delete.
    pub channel_id: u64,
}

impl Wire for DeleteChannel {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.channel_id);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            channel_id: get_u64(buf)?,
        })
    }
}

/// CHANNEL_DELETED: broadcast to every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelDeleted {
    /// The deleted channel.
    pub channel_id: u64,
}

impl Wire for ChannelDeleted {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.channel_id);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            channel_id: get_u64(buf)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::{round_trip, Message};
    use super::*;

    fn channel_fixture() -> ChannelInfo {
        ChannelInfo {
            id: 1,
            name: "general".into(),
            description: "Town square".into(),
            channel_type: 0,
            retention_hours: 168,
            has_subchannels: false,
            is_private: false,
            created_at: 1_700_000_000_000,
        }
    }

    #[test]
    fn channel_round_trips() {
        round_trip(Message::ListChannels(ListChannels));
        round_trip(Message::ChannelList(ChannelList {
            channels: vec![channel_fixture()],
        }));
        round_trip(Message::JoinChannel(JoinChannel {
            channel_id: 1,
            subchannel_id: Some(4),
        }));
        round_trip(Message::JoinResponse(JoinResponse {
            success: true,
            channel_id: 1,
            subchannel_id: None,
            message: None,
        }));
        round_trip(Message::LeaveChannel(LeaveChannel { channel_id: 1 }));
        round_trip(Message::LeaveResponse(LeaveResponse {
            success: true,
            channel_id: 1,
        }));
    }

    #[test]
    fn create_round_trips() {
        round_trip(Message::CreateChannel(CreateChannel {
            name: "dev".into(),
            description: String::new(),
            channel_type: 1,
            retention_hours: 0,
        }));
        round_trip(Message::ChannelCreated(ChannelCreated {
            channel: channel_fixture(),
        }));
        round_trip(Message::CreateSubchannel(CreateSubchannel {
            channel_id: 1,
            name: "announcements".into(),
            description: "read only-ish".into(),
            channel_type: 1,
            retention_hours: 0,
        }));
        round_trip(Message::SubchannelCreated(SubchannelCreated {
            subchannel: SubchannelInfo {
                id: 2,
                channel_id: 1,
                name: "announcements".into(),
                description: String::new(),
                channel_type: 1,
                retention_hours: 0,
            },
        }));
    }

    #[test]
    fn listing_round_trips() {
        round_trip(Message::GetSubchannels(GetSubchannels { channel_id: 1 }));
        round_trip(Message::SubchannelList(SubchannelList {
            channel_id: 1,
            subchannels: vec![],
        }));
        round_trip(Message::ListChannelUsers(ListChannelUsers { channel_id: 1 }));
        round_trip(Message::ChannelUserList(ChannelUserList {
            channel_id: 1,
            nicknames: vec!["~alice".into(), "bob".into()],
        }));
        round_trip(Message::DeleteChannel(DeleteChannel { channel_id: 9 }));
        round_trip(Message::ChannelDeleted(ChannelDeleted { channel_id: 9 }));
    }
}
