//! Message posting, editing, deletion, and querying payloads.

use bytes::{BufMut, Bytes, BytesMut};

use super::{MessageInfo, Wire};
use crate::error::WireError;
use crate::wire::*;

/// LIST_MESSAGES.
///
/// Without `parent_id`: root messages, newest window selected by
/// `before_id`/`after_id`. With `parent_id`: the depth-first subtree of
/// that message. `before_id` takes precedence when both cursors are given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListMessages {
    /// Channel to query.
    pub channel_id: u64,
    /// Subchannel scope, if any.
    pub subchannel_id: Option<u64>,
    /// Parent message for subtree queries.
    pub parent_id: Option<u64>,
    /// Return messages with id strictly below this.
    pub before_id: Option<u64>,
    /// Return messages with id strictly above this.
    pub after_id: Option<u64>,
    /// Result cap; the server clamps to 200.
    pub limit: u16,
}

impl Wire for ListMessages {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.channel_id);
        put_opt_u64(buf, self.subchannel_id);
        put_opt_u64(buf, self.parent_id);
        put_opt_u64(buf, self.before_id);
        put_opt_u64(buf, self.after_id);
        buf.put_u16(self.limit);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            channel_id: get_u64(buf)?,
            subchannel_id: get_opt_u64(buf)?,
            parent_id: get_opt_u64(buf)?,
            before_id: get_opt_u64(buf)?,
            after_id: get_opt_u64(buf)?,
            limit: get_u16(buf)?,
        })
    }
}

/// MESSAGE_LIST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageList {
    /// Channel queried.
    pub channel_id: u64,
    /// Subchannel scope echoed back.
    pub subchannel_id: Option<u64>,
    /// Parent echoed back for subtree queries.
    pub parent_id: Option<u64>,
    /// Result rows.
    pub messages: Vec<MessageInfo>,
}

impl Wire for MessageList {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.channel_id);
        put_opt_u64(buf, self.subchannel_id);
        put_opt_u64(buf, self.parent_id);
        put_list(buf, &self.messages, |b, m| m.encode(b));
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            channel_id: get_u64(buf)?,
            subchannel_id: get_opt_u64(buf)?,
            parent_id: get_opt_u64(buf)?,
            messages: get_list(buf, MessageInfo::decode)?,
        })
    }
}

/// POST_MESSAGE. `content` is UTF-8 unless the frame's encrypted flag is
/// set, in which case it is opaque ciphertext relayed verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostMessage {
    /// Target channel.
    pub channel_id: u64,
    /// Target subchannel, if any.
    pub subchannel_id: Option<u64>,
    /// Parent message for replies.
    pub parent_id: Option<u64>,
    /// Body bytes.
    pub content: Vec<u8>,
}

impl Wire for PostMessage {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.channel_id);
        put_opt_u64(buf, self.subchannel_id);
        put_opt_u64(buf, self.parent_id);
        put_blob(buf, &self.content);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            channel_id: get_u64(buf)?,
            subchannel_id: get_opt_u64(buf)?,
            parent_id: get_opt_u64(buf)?,
            content: get_blob(buf)?,
        })
    }
}

/// MESSAGE_POSTED: acknowledgement to the author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePosted {
    /// Whether the message was persisted.
    pub success: bool,
    /// Assigned message id on success.
    pub message_id: Option<u64>,
    /// Failure detail.
    pub message: Option<String>,
}

impl Wire for MessagePosted {
    fn encode(&self, buf: &mut BytesMut) {
        put_bool(buf, self.success);
        put_opt_u64(buf, self.message_id);
        put_opt_string(buf, &self.message);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            success: get_bool(buf)?,
            message_id: get_opt_u64(buf)?,
            message: get_opt_string(buf)?,
        })
    }
}

/// NEW_MESSAGE: unsolicited fan-out of a freshly committed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    /// The committed message.
    pub message: MessageInfo,
}

impl Wire for NewMessage {
    fn encode(&self, buf: &mut BytesMut) {
        self.message.encode(buf);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            message: MessageInfo::decode(buf)?,
        })
    }
}

/// EDIT_MESSAGE: author- or admin-only content replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditMessage {
    /// Channel the message lives in.
    pub channel_id: u64,
    /// Message to edit.
    pub message_id: u64,
    /// Replacement body bytes.
    pub content: Vec<u8>,
}

impl Wire for EditMessage {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.channel_id);
        buf.put_u64(self.message_id);
        put_blob(buf, &self.content);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            channel_id: get_u64(buf)?,
            message_id: get_u64(buf)?,
            content: get_blob(buf)?,
        })
    }
}

/// MESSAGE_EDITED: acknowledgement and routed broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEdited {
    /// Whether the edit was applied.
    pub success: bool,
    /// The edited message id.
    pub message_id: u64,
    /// New content bytes (present on broadcast).
    pub content: Vec<u8>,
    /// Edit timestamp, UNIX ms.
    pub edited_at: i64,
    /// Failure detail.
    pub message: Option<String>,
}

impl Wire for MessageEdited {
    fn encode(&self, buf: &mut BytesMut) {
        put_bool(buf, self.success);
        buf.put_u64(self.message_id);
        put_blob(buf, &self.content);
        buf.put_i64(self.edited_at);
        put_opt_string(buf, &self.message);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            success: get_bool(buf)?,
            message_id: get_u64(buf)?,
            content: get_blob(buf)?,
            edited_at: get_i64(buf)?,
            message: get_opt_string(buf)?,
        })
    }
}

/// DELETE_MESSAGE: soft deletion preserving thread structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteMessage {
    /// Channel the message lives in.
    pub channel_id: u64,
    /// Message to delete.
    pub message_id: u64,
}

impl Wire for DeleteMessage {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.channel_id);
        buf.put_u64(self.message_id);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            channel_id: get_u64(buf)?,
            message_id: get_u64(buf)?,
        })
    }
}

/// MESSAGE_DELETED: acknowledgement and routed broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDeleted {
    /// Whether the deletion was applied.
    pub success: bool,
    /// The deleted message id.
    pub message_id: u64,
    /// Deletion timestamp, UNIX ms.
    pub deleted_at: i64,
    /// Failure detail.
    pub message: Option<String>,
}

impl Wire for MessageDeleted {
    fn encode(&self, buf: &mut BytesMut) {
        put_bool(buf, self.success);
        buf.put_u64(self.message_id);
        buf.put_i64(self.deleted_at);
        put_opt_string(buf, &self.message);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            success: get_bool(buf)?,
            message_id: get_u64(buf)?,
            deleted_at: get_i64(buf)?,
            message: get_opt_string(buf)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::{round_trip, Message};
    use super::*;

    fn info_fixture() -> MessageInfo {
        MessageInfo {
            id: 3,
            channel_id: 1,
            subchannel_id: None,
            parent_id: Some(1),
            author_user_id: None,
            author_nickname: "~alice".into(),
            content: b"hi there".to_vec(),
            created_at: 1_700_000_000_000,
            edited_at: None,
            deleted_at: None,
            thread_root_id: 1,
            thread_depth: 1,
            encrypted: false,
        }
    }

    #[test]
    fn query_round_trips() {
        round_trip(Message::ListMessages(ListMessages {
            channel_id: 1,
            subchannel_id: None,
            parent_id: Some(5),
            before_id: Some(100),
            after_id: Some(50),
            limit: 200,
        }));
        round_trip(Message::MessageList(MessageList {
            channel_id: 1,
            subchannel_id: None,
            parent_id: None,
            messages: vec![info_fixture()],
        }));
    }

    #[test]
    fn post_round_trips() {
        round_trip(Message::PostMessage(PostMessage {
            channel_id: 1,
            subchannel_id: Some(2),
            parent_id: None,
            content: b"hello".to_vec(),
        }));
        round_trip(Message::MessagePosted(MessagePosted {
            success: true,
            message_id: Some(17),
            message: None,
        }));
        round_trip(Message::NewMessage(NewMessage {
            message: info_fixture(),
        }));
    }

    #[test]
    fn mutation_round_trips() {
        round_trip(Message::EditMessage(EditMessage {
            channel_id: 1,
            message_id: 3,
            content: b"edited".to_vec(),
        }));
        round_trip(Message::MessageEdited(MessageEdited {
            success: true,
            message_id: 3,
            content: b"edited".to_vec(),
            edited_at: 1_700_000_000_500,
            message: None,
        }));
        round_trip(Message::DeleteMessage(DeleteMessage {
            channel_id: 1,
            message_id: 3,
        }));
        round_trip(Message::MessageDeleted(MessageDeleted {
            success: true,
            message_id: 3,
            deleted_at: 1_700_000_001_000,
            message: None,
        }));
    }

    #[test]
    fn opaque_content_survives() {
        // Ciphertext is not UTF-8; the blob codec must not care.
        let ciphertext: Vec<u8> = (0..=255u8).collect();
        round_trip(Message::PostMessage(PostMessage {
            channel_id: 7,
            subchannel_id: None,
            parent_id: None,
            content: ciphertext,
        }));
    }
}
