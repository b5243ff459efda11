//! Protocol error types and the stable numeric error taxonomy.

use thiserror::Error;

/// Errors produced while decoding wire primitives or payloads.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// The buffer ended before the value was complete.
    #[error("truncated input: needed {needed} more byte(s)")]
    Truncated {
        /// How many additional bytes were required.
        needed: usize,
    },

    /// A string field was not valid UTF-8.
    #[error("invalid UTF-8 in string field")]
    InvalidUtf8,

    /// An optional-field presence byte was neither 0 nor 1.
    #[error("invalid presence byte {0:#04x}")]
    InvalidPresence(u8),

    /// A boolean byte was neither 0 nor 1.
    #[error("invalid boolean byte {0:#04x}")]
    InvalidBool(u8),

    /// An enum discriminant had no defined meaning.
    #[error("invalid discriminant {value:#04x} for {what}")]
    InvalidDiscriminant {
        /// The field being decoded.
        what: &'static str,
        /// The offending byte.
        value: u8,
    },

    /// The message type byte is not part of the catalog.
    #[error("unknown message type {0:#04x}")]
    UnknownMessageType(u8),

    /// Bytes remained after the payload was fully decoded.
    #[error("trailing bytes after payload")]
    TrailingBytes,

    /// A declared length exceeded the bytes actually present.
    #[error("declared length {declared} exceeds remaining {remaining}")]
    LengthOverrun {
        /// The length the peer declared.
        declared: usize,
        /// Bytes actually available.
        remaining: usize,
    },
}

/// Stable numeric error codes carried by ERROR frames.
///
/// Ranges follow the server's error-handling policy:
/// 1xxx protocol, 2xxx auth, 3xxx authorization, 4xxx not-found,
/// 5xxx rate/capacity, 6xxx validation, 9xxx internal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    /// A protocol feature the server does not support.
    UnsupportedFeature = 1000,
    /// Frame version newer than the server speaks. Connection stays open.
    VersionMismatch = 1001,
    /// Malformed frame. The server closes the connection.
    MalformedFrame = 1002,
    /// Frame length exceeded the hard cap. The server closes the connection.
    FrameTooLarge = 1003,

    /// Credentials did not verify.
    AuthFailed = 2000,
    /// Too many failed authentication attempts this session.
    TooManyAuthAttempts = 2001,
    /// The operation requires a registered, authenticated user.
    RegistrationRequired = 2002,
    /// The nickname belongs to a registered user; authenticate to use it.
    NicknameRequiresAuth = 2003,

    /// The acting user is banned.
    Banned = 3000,
    /// The operation requires the admin flag.
    AdminRequired = 3001,
    /// Only the author (or an admin) may modify a message.
    NotAuthor = 3002,

    /// Channel not found.
    ChannelNotFound = 4000,
    /// Message not found.
    MessageNotFound = 4001,
    /// User not found.
    UserNotFound = 4002,
    /// Subchannel not found.
    SubchannelNotFound = 4003,
    /// Target session or user not found / not online.
    TargetNotFound = 4004,

    /// Message rate limit exceeded.
    MessageRateExceeded = 5001,
    /// Channel-creation rate limit exceeded.
    ChannelCreateRateExceeded = 5002,
    /// Subscription cap reached.
    SubscriptionCapReached = 5003,
    /// Outbound queue overflowed (reported in logs; the session closes).
    QueueOverflow = 5004,
    /// Directory registration rate limit exceeded.
    DirectoryRateExceeded = 5005,

    /// Generic validation failure.
    InvalidRequest = 6000,
    /// Message content exceeds the configured maximum.
    MessageTooLong = 6001,
    /// The named target is invalid.
    BadTarget = 6002,
    /// Nickname empty or containing forbidden characters.
    InvalidNickname = 6003,
    /// Nickname already registered (concurrent-registration loser).
    NicknameTaken = 6004,

    /// Internal server error. The session stays alive when possible.
    Internal = 9000,
}

impl ErrorCode {
    /// Numeric wire value.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Reconstruct from a wire value, if it is a known code.
    pub fn from_code(code: u32) -> Option<Self> {
        use ErrorCode::*;
        Some(match code {
            1000 => UnsupportedFeature,
            1001 => VersionMismatch,
            1002 => MalformedFrame,
            1003 => FrameTooLarge,
            2000 => AuthFailed,
            2001 => TooManyAuthAttempts,
            2002 => RegistrationRequired,
            2003 => NicknameRequiresAuth,
            3000 => Banned,
            3001 => AdminRequired,
            3002 => NotAuthor,
            4000 => ChannelNotFound,
            4001 => MessageNotFound,
            4002 => UserNotFound,
            4003 => SubchannelNotFound,
            4004 => TargetNotFound,
            5001 => MessageRateExceeded,
            5002 => ChannelCreateRateExceeded,
            5003 => SubscriptionCapReached,
            5004 => QueueOverflow,
            5005 => DirectoryRateExceeded,
            6000 => InvalidRequest,
            6001 => MessageTooLong,
            6002 => BadTarget,
            6003 => InvalidNickname,
            6004 => NicknameTaken,
            9000 => Internal,
            _ => return None,
        })
    }

    /// Whether the server closes the connection after reporting this code.
    pub fn is_fatal(self) -> bool {
        matches!(self, ErrorCode::MalformedFrame | ErrorCode::FrameTooLarge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_round_trip() {
        for code in [
            ErrorCode::VersionMismatch,
            ErrorCode::AuthFailed,
            ErrorCode::Banned,
            ErrorCode::ChannelNotFound,
            ErrorCode::MessageRateExceeded,
            ErrorCode::NicknameTaken,
            ErrorCode::Internal,
        ] {
            assert_eq!(ErrorCode::from_code(code.code()), Some(code));
        }
        assert_eq!(ErrorCode::from_code(1234), None);
    }

    #[test]
    fn fatal_codes() {
        assert!(ErrorCode::MalformedFrame.is_fatal());
        assert!(ErrorCode::FrameTooLarge.is_fatal());
        assert!(!ErrorCode::VersionMismatch.is_fatal());
        assert!(!ErrorCode::Internal.is_fatal());
    }
}
