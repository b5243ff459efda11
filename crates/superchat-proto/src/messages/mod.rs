//! Typed payloads for every message in the catalog.
//!
//! Each payload implements [`Wire`]; [`Message`] is the closed union used by
//! session dispatch. Decoding validates that no trailing bytes remain after
//! the payload, so a frame either decodes exactly or errors.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::WireError;
use crate::frame::{Frame, FLAG_ENCRYPTED, PROTOCOL_VERSION};
use crate::types::MessageType;

mod auth;
mod channel;
mod control;
mod directory;
mod dm;
mod message;
mod moderation;
mod records;
mod sync;
mod user;

pub use auth::*;
pub use channel::*;
pub use control::*;
pub use directory::*;
pub use dm::*;
pub use message::*;
pub use moderation::*;
pub use records::*;
pub use sync::*;
pub use user::*;

/// Binary encoding of one payload type.
pub trait Wire: Sized {
    /// Append the wire form to `buf`.
    fn encode(&self, buf: &mut BytesMut);

    /// Read one value from `buf`.
    fn decode(buf: &mut Bytes) -> Result<Self, WireError>;
}

macro_rules! messages {
    ($($code:ident($payload:ty)),+ $(,)?) => {
        /// A decoded frame payload, tagged by message type.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Message {
            $(
                #[doc = concat!("Payload for `", stringify!($code), "`.")]
                $code($payload),
            )+
        }

        impl Message {
            /// The wire type code for this payload.
            pub fn msg_type(&self) -> MessageType {
                match self {
                    $(Self::$code(_) => MessageType::$code,)+
                }
            }

            /// Encode just the payload bytes.
            pub fn encode_payload(&self) -> Bytes {
                let mut buf = BytesMut::new();
                match self {
                    $(Self::$code(p) => p.encode(&mut buf),)+
                }
                buf.freeze()
            }

            /// Decode a payload of the given type, consuming `buf` exactly.
            pub fn decode(msg_type: MessageType, buf: &mut Bytes) -> Result<Self, WireError> {
                let msg = match msg_type {
                    $(MessageType::$code => Self::$code(<$payload>::decode(buf)?),)+
                };
                if buf.has_remaining() {
                    return Err(WireError::TrailingBytes);
                }
                Ok(msg)
            }
        }
    };
}

messages! {
    AuthRequest(AuthRequest),
    SetNickname(SetNickname),
    RegisterUser(RegisterUser),
    ListChannels(ListChannels),
    JoinChannel(JoinChannel),
    LeaveChannel(LeaveChannel),
    CreateChannel(CreateChannel),
    CreateSubchannel(CreateSubchannel),
    ListMessages(ListMessages),
    PostMessage(PostMessage),
    EditMessage(EditMessage),
    DeleteMessage(DeleteMessage),
    AddSshKey(AddSshKey),
    ChangePassword(ChangePassword),
    GetUserInfo(GetUserInfo),
    Ping(Ping),
    Disconnect(Disconnect),
    UpdateSshKeyLabel(UpdateSshKeyLabel),
    DeleteSshKey(DeleteSshKey),
    ListSshKeys(ListSshKeys),
    GetSubchannels(GetSubchannels),
    ListUsers(ListUsers),
    ListChannelUsers(ListChannelUsers),
    GetUnreadCounts(GetUnreadCounts),
    StartDm(StartDm),
    ProvidePublicKey(ProvidePublicKey),
    AllowUnencrypted(AllowUnencrypted),
    Logout(Logout),
    UpdateReadState(UpdateReadState),
    SubscribeThread(SubscribeThread),
    UnsubscribeThread(UnsubscribeThread),
    SubscribeChannel(SubscribeChannel),
    UnsubscribeChannel(UnsubscribeChannel),
    ListServers(ListServers),
    RegisterServer(RegisterServer),
    Heartbeat(Heartbeat),
    VerifyResponse(VerifyResponse),
    BanUser(BanUser),
    BanIp(BanIp),
    Unban(Unban),
    ListBans(ListBans),
    DeleteUser(DeleteUser),
    DeleteChannel(DeleteChannel),

    AuthResponse(AuthResponse),
    NicknameResponse(NicknameResponse),
    RegisterResponse(RegisterResponse),
    ChannelList(ChannelList),
    JoinResponse(JoinResponse),
    LeaveResponse(LeaveResponse),
    ChannelCreated(ChannelCreated),
    SubchannelCreated(SubchannelCreated),
    MessageList(MessageList),
    MessagePosted(MessagePosted),
    MessageEdited(MessageEdited),
    MessageDeleted(MessageDeleted),
    NewMessage(NewMessage),
    SshKeyAdded(SshKeyAdded),
    PasswordChanged(PasswordChanged),
    UserInfo(UserInfo),
    Error(ErrorMessage),
    Pong(Pong),
    ServerDisconnect(ServerDisconnect),
    SshKeyLabelUpdated(SshKeyLabelUpdated),
    SshKeyDeleted(SshKeyDeleted),
    SshKeyList(SshKeyList),
    SubchannelList(SubchannelList),
    ServerConfig(ServerConfig),
    SubscribeOk(SubscribeOk),
    UserList(UserList),
    ChannelUserList(ChannelUserList),
    UnreadCounts(UnreadCounts),
    DmPending(DmPending),
    DmRequest(DmRequest),
    KeyRequired(KeyRequired),
    DmReady(DmReady),
    DmParticipantLeft(DmParticipantLeft),
    LogoutResponse(LogoutResponse),
    ReadStateUpdated(ReadStateUpdated),
    ServerList(ServerList),
    RegisterAck(RegisterAck),
    HeartbeatAck(HeartbeatAck),
    VerifyRegistration(VerifyRegistration),
    BanResponse(BanResponse),
    BanList(BanList),
    UserDeleted(UserDeleted),
    ChannelDeleted(ChannelDeleted),
    ChannelPresence(ChannelPresence),
    ServerPresence(ServerPresence),
}

impl Message {
    /// Wrap this payload in an unflagged frame at the current version.
    pub fn to_frame(&self) -> Frame {
        Frame {
            version: PROTOCOL_VERSION,
            msg_type: self.msg_type().code(),
            flags: 0,
            payload: self.encode_payload(),
        }
    }

    /// Wrap this payload in a frame with the encrypted flag set.
    pub fn to_encrypted_frame(&self) -> Frame {
        Frame {
            version: PROTOCOL_VERSION,
            msg_type: self.msg_type().code(),
            flags: FLAG_ENCRYPTED,
            payload: self.encode_payload(),
        }
    }
}

#[cfg(test)]
pub(crate) fn round_trip(msg: Message) {
    let frame = msg.to_frame();
    let decoded = frame.message().expect("decode");
    assert_eq!(decoded, msg);
}
