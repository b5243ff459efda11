//! Message type codes.
//!
//! Client-originated types occupy 0x01–0x5E; server-originated types occupy
//! 0x81–0xAD. The directory handshake reuses the same session framing, so a
//! server being verified receives [`MessageType::VerifyRegistration`] inbound
//! on an ordinary connection.

use crate::error::WireError;

macro_rules! message_types {
    ($($(#[$doc:meta])* $name:ident = $code:literal),+ $(,)?) => {
        /// Wire type code of a frame payload.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum MessageType {
            $($(#[$doc])* $name = $code),+
        }

        impl MessageType {
            /// The wire byte.
            pub fn code(self) -> u8 {
                self as u8
            }
        }

        impl TryFrom<u8> for MessageType {
            type Error = WireError;

            fn try_from(value: u8) -> Result<Self, WireError> {
                match value {
                    $($code => Ok(MessageType::$name),)+
                    other => Err(WireError::UnknownMessageType(other)),
                }
            }
        }
    };
}

message_types! {
    /// Authenticate with a nickname and pre-hashed password.
    AuthRequest = 0x01,
    /// Claim a session nickname.
    SetNickname = 0x02,
    /// Register a new user.
    RegisterUser = 0x03,
    /// List public channels.
    ListChannels = 0x04,
    /// Join a channel (roster membership).
    JoinChannel = 0x05,
    /// Leave a channel.
    LeaveChannel = 0x06,
    /// Create a channel.
    CreateChannel = 0x07,
    /// Create a subchannel under a channel.
    CreateSubchannel = 0x08,
    /// Query messages (roots or a thread subtree).
    ListMessages = 0x09,
    /// Post a message.
    PostMessage = 0x0A,
    /// Edit a message.
    EditMessage = 0x0B,
    /// Soft-delete a message.
    DeleteMessage = 0x0C,
    /// Attach an SSH public key to the authenticated user.
    AddSshKey = 0x0D,
    /// Change or remove the account password.
    ChangePassword = 0x0E,
    /// Look up a user by nickname.
    GetUserInfo = 0x0F,
    /// Keepalive. The only message that resets the idle timer.
    Ping = 0x10,
    /// Client-initiated disconnect.
    Disconnect = 0x11,
    /// Rename an SSH key label.
    UpdateSshKeyLabel = 0x12,
    /// Remove an SSH key.
    DeleteSshKey = 0x13,
    /// List the authenticated user's SSH keys.
    ListSshKeys = 0x14,
    /// List subchannels of a channel.
    GetSubchannels = 0x15,
    /// List registered users.
    ListUsers = 0x16,
    /// List sessions joined to a channel.
    ListChannelUsers = 0x17,
    /// Query unread counts.
    GetUnreadCounts = 0x18,
    /// Begin a direct-message negotiation.
    StartDm = 0x19,
    /// Provide an X25519 public key for DM encryption.
    ProvidePublicKey = 0x1A,
    /// Accept unencrypted DMs (per-invite or permanently).
    AllowUnencrypted = 0x1B,
    /// Drop authentication, return to anonymous.
    Logout = 0x1C,
    /// Persist a read-state watermark.
    UpdateReadState = 0x1D,

    /// Subscribe to a thread's replies.
    SubscribeThread = 0x51,
    /// Unsubscribe from a thread.
    UnsubscribeThread = 0x52,
    /// Subscribe to channel-root events.
    SubscribeChannel = 0x53,
    /// Unsubscribe from a channel.
    UnsubscribeChannel = 0x54,
    /// Request the directory's server list.
    ListServers = 0x55,
    /// Announce a server to a directory.
    RegisterServer = 0x56,
    /// Periodic directory heartbeat.
    Heartbeat = 0x57,
    /// Echo of a verification challenge.
    VerifyResponse = 0x58,
    /// Ban a user (admin).
    BanUser = 0x59,
    /// Ban an IP or CIDR block (admin).
    BanIp = 0x5A,
    /// Lift a ban (admin).
    Unban = 0x5B,
    /// List bans (admin).
    ListBans = 0x5C,
    /// Delete a user and cascade (admin).
    DeleteUser = 0x5D,
    /// Delete a channel (admin).
    DeleteChannel = 0x5E,

    /// Result of AUTH_REQUEST.
    AuthResponse = 0x81,
    /// Result of SET_NICKNAME.
    NicknameResponse = 0x82,
    /// Result of REGISTER_USER.
    RegisterResponse = 0x83,
    /// Public channel listing.
    ChannelList = 0x84,
    /// Result of JOIN_CHANNEL.
    JoinResponse = 0x85,
    /// Result of LEAVE_CHANNEL.
    LeaveResponse = 0x86,
    /// A channel was created (response and broadcast).
    ChannelCreated = 0x87,
    /// A subchannel was created (response and broadcast).
    SubchannelCreated = 0x88,
    /// Message query results.
    MessageList = 0x89,
    /// Result of POST_MESSAGE.
    MessagePosted = 0x8A,
    /// A message was edited (response and routed broadcast).
    MessageEdited = 0x8B,
    /// A message was deleted (response and routed broadcast).
    MessageDeleted = 0x8C,
    /// Unsolicited new-message event.
    NewMessage = 0x8D,
    /// Result of ADD_SSH_KEY.
    SshKeyAdded = 0x8E,
    /// Result of CHANGE_PASSWORD.
    PasswordChanged = 0x8F,
    /// Result of GET_USER_INFO.
    UserInfo = 0x90,
    /// Error report with a stable numeric code.
    Error = 0x91,
    /// Keepalive reply.
    Pong = 0x92,
    /// Server-initiated disconnect with reason.
    ServerDisconnect = 0x93,
    /// Result of UPDATE_SSH_KEY_LABEL.
    SshKeyLabelUpdated = 0x94,
    /// Result of DELETE_SSH_KEY.
    SshKeyDeleted = 0x95,
    /// SSH key listing.
    SshKeyList = 0x96,
    /// Subchannel listing.
    SubchannelList = 0x97,
    /// Server limits, sent immediately after accept.
    ServerConfig = 0x98,
    /// Result of subscribe/unsubscribe operations.
    SubscribeOk = 0x99,
    /// Registered-user listing.
    UserList = 0x9A,
    /// Channel roster listing.
    ChannelUserList = 0x9B,
    /// Unread count results.
    UnreadCounts = 0x9C,
    /// DM invite is waiting on the target.
    DmPending = 0x9D,
    /// Incoming DM invite notification.
    DmRequest = 0x9E,
    /// The server needs a public key to proceed with a DM.
    KeyRequired = 0x9F,
    /// DM channel is ready.
    DmReady = 0xA0,
    /// The DM peer disconnected before or after ready.
    DmParticipantLeft = 0xA1,
    /// Result of LOGOUT.
    LogoutResponse = 0xA2,
    /// Result of UPDATE_READ_STATE.
    ReadStateUpdated = 0xA3,
    /// Directory server listing.
    ServerList = 0xA4,
    /// Result of REGISTER_SERVER (carries the assigned heartbeat interval).
    RegisterAck = 0xA5,
    /// Result of HEARTBEAT.
    HeartbeatAck = 0xA6,
    /// Directory verification challenge (sent over a back-connection).
    VerifyRegistration = 0xA7,
    /// Result of BAN_USER / BAN_IP / UNBAN.
    BanResponse = 0xA8,
    /// Ban listing (admin).
    BanList = 0xA9,
    /// A user was deleted (broadcast).
    UserDeleted = 0xAA,
    /// A channel was deleted (broadcast).
    ChannelDeleted = 0xAB,
    /// Join/leave presence event for a channel roster.
    ChannelPresence = 0xAC,
    /// Connect/disconnect presence event for the whole server.
    ServerPresence = 0xAD,
}
