//! Unified error handling for superchatd.
//!
//! Handlers return [`HandlerError`]; the dispatcher maps each variant to an
//! ERROR frame with a stable numeric code, and decides whether the session
//! survives. Only malformed frames and oversized frames are fatal.

use superchat_proto::messages::ErrorMessage;
use superchat_proto::ErrorCode;
use thiserror::Error;

use crate::repo::RepoError;

/// Errors that can occur while handling a client message.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("unsupported protocol feature: {0}")]
    Unsupported(String),

    #[error("protocol version {0} not supported")]
    VersionMismatch(u8),

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("authentication failed")]
    AuthFailed,

    #[error("too many failed authentication attempts")]
    TooManyAuthAttempts,

    #[error("registration required")]
    RegistrationRequired,

    #[error("nickname is registered, password required")]
    NicknameRequiresAuth,

    #[error("you are banned: {0}")]
    Banned(String),

    #[error("admin privileges required")]
    AdminRequired,

    #[error("only the author or an admin may do that")]
    NotAuthor,

    #[error("channel {0} not found")]
    ChannelNotFound(u64),

    #[error("subchannel {0} not found")]
    SubchannelNotFound(u64),

    #[error("message {0} not found")]
    MessageNotFound(u64),

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("target not found: {0}")]
    TargetNotFound(String),

    #[error("message rate limit exceeded")]
    MessageRateExceeded,

    #[error("channel creation rate limit exceeded")]
    ChannelCreateRateExceeded,

    #[error("subscription limit reached ({0})")]
    SubscriptionCap(&'static str),

    #[error("directory registration rate limit exceeded")]
    DirectoryRateExceeded,

    #[error("{0}")]
    Validation(String),

    #[error("message too long: {actual} bytes (limit {limit})")]
    MessageTooLong { actual: usize, limit: usize },

    #[error("invalid nickname: {0}")]
    InvalidNickname(String),

    #[error("nickname already taken: {0}")]
    NicknameTaken(String),

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    /// The stable numeric code reported to the client.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Unsupported(_) => ErrorCode::UnsupportedFeature,
            Self::VersionMismatch(_) => ErrorCode::VersionMismatch,
            Self::Malformed(_) => ErrorCode::MalformedFrame,
            Self::AuthFailed => ErrorCode::AuthFailed,
            Self::TooManyAuthAttempts => ErrorCode::TooManyAuthAttempts,
            Self::RegistrationRequired => ErrorCode::RegistrationRequired,
            Self::NicknameRequiresAuth => ErrorCode::NicknameRequiresAuth,
            Self::Banned(_) => ErrorCode::Banned,
            Self::AdminRequired => ErrorCode::AdminRequired,
            Self::NotAuthor => ErrorCode::NotAuthor,
            Self::ChannelNotFound(_) => ErrorCode::ChannelNotFound,
            Self::SubchannelNotFound(_) => ErrorCode::SubchannelNotFound,
            Self::MessageNotFound(_) => ErrorCode::MessageNotFound,
            Self::UserNotFound(_) => ErrorCode::UserNotFound,
            Self::TargetNotFound(_) => ErrorCode::TargetNotFound,
            Self::MessageRateExceeded => ErrorCode::MessageRateExceeded,
            Self::ChannelCreateRateExceeded => ErrorCode::ChannelCreateRateExceeded,
            Self::SubscriptionCap(_) => ErrorCode::SubscriptionCapReached,
            Self::DirectoryRateExceeded => ErrorCode::DirectoryRateExceeded,
            Self::Validation(_) => ErrorCode::InvalidRequest,
            Self::MessageTooLong { .. } => ErrorCode::MessageTooLong,
            Self::InvalidNickname(_) => ErrorCode::InvalidNickname,
            Self::NicknameTaken(_) => ErrorCode::NicknameTaken,
            Self::Repo(e) => match e {
                RepoError::UserNotFound => ErrorCode::UserNotFound,
                RepoError::ChannelNotFound => ErrorCode::ChannelNotFound,
                RepoError::SubchannelNotFound => ErrorCode::SubchannelNotFound,
                RepoError::MessageNotFound => ErrorCode::MessageNotFound,
                RepoError::KeyNotFound | RepoError::BanNotFound => ErrorCode::TargetNotFound,
                RepoError::NicknameTaken(_) => ErrorCode::NicknameTaken,
                RepoError::NameConflict(_) | RepoError::FingerprintConflict => {
                    ErrorCode::InvalidRequest
                }
                RepoError::Storage(_) => ErrorCode::Internal,
            },
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Whether the connection closes after this error is reported.
    pub fn is_fatal(&self) -> bool {
        self.code().is_fatal()
    }

    /// The ERROR frame payload for this error.
    pub fn to_error_message(&self) -> ErrorMessage {
        ErrorMessage::new(self.code(), self.to_string())
    }

    /// Static label for metrics.
    pub fn metric_label(&self) -> &'static str {
        match self.code() {
            ErrorCode::UnsupportedFeature
            | ErrorCode::VersionMismatch
            | ErrorCode::MalformedFrame
            | ErrorCode::FrameTooLarge => "protocol",
            ErrorCode::AuthFailed
            | ErrorCode::TooManyAuthAttempts
            | ErrorCode::RegistrationRequired
            | ErrorCode::NicknameRequiresAuth => "auth",
            ErrorCode::Banned | ErrorCode::AdminRequired | ErrorCode::NotAuthor => "authz",
            ErrorCode::ChannelNotFound
            | ErrorCode::MessageNotFound
            | ErrorCode::UserNotFound
            | ErrorCode::SubchannelNotFound
            | ErrorCode::TargetNotFound => "not_found",
            ErrorCode::MessageRateExceeded
            | ErrorCode::ChannelCreateRateExceeded
            | ErrorCode::SubscriptionCapReached
            | ErrorCode::QueueOverflow
            | ErrorCode::DirectoryRateExceeded => "limit",
            ErrorCode::InvalidRequest
            | ErrorCode::MessageTooLong
            | ErrorCode::BadTarget
            | ErrorCode::InvalidNickname
            | ErrorCode::NicknameTaken => "validation",
            ErrorCode::Internal => "internal",
        }
    }
}

/// Result type for message handlers.
pub type HandlerResult = Result<(), HandlerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_map_to_spec_ranges() {
        assert_eq!(HandlerError::AuthFailed.code().code(), 2000);
        assert_eq!(HandlerError::Banned("x".into()).code().code(), 3000);
        assert_eq!(HandlerError::ChannelNotFound(1).code().code(), 4000);
        assert_eq!(HandlerError::MessageRateExceeded.code().code(), 5001);
        assert_eq!(HandlerError::ChannelCreateRateExceeded.code().code(), 5002);
        assert_eq!(
            HandlerError::MessageTooLong { actual: 10, limit: 5 }.code().code(),
            6001
        );
        assert_eq!(HandlerError::Internal("boom".into()).code().code(), 9000);
    }

    #[test]
    fn repo_errors_translate() {
        assert_eq!(
            HandlerError::from(RepoError::NicknameTaken("a".into())).code().code(),
            6004
        );
        assert_eq!(
            HandlerError::from(RepoError::ChannelNotFound).code().code(),
            4000
        );
    }

    #[test]
    fn only_malformed_is_fatal() {
        assert!(HandlerError::Malformed("x".into()).is_fatal());
        assert!(!HandlerError::AuthFailed.is_fatal());
        assert!(!HandlerError::Internal("x".into()).is_fatal());
    }
}
