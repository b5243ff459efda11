//! Message handlers, one module per protocol family.
//!
//! Handlers are free async functions taking the dispatch
//! [`Context`](crate::session::Context) and the typed payload. They reply
//! by enqueueing frames on the session's writer and signal failures with
//! [`HandlerError`](crate::error::HandlerError), which the dispatcher maps
//! to ERROR frames.

pub mod auth;
pub mod channels;
pub mod control;
pub mod directory;
pub mod dm;
pub mod messages;
pub mod moderation;
pub mod read_state;
pub mod ssh_keys;
pub mod subscriptions;
pub mod users;

use superchat_proto::messages::{Message, ServerPresence};

use crate::session::Context;

/// Emit SERVER_PRESENCE(online=true) the first time a session becomes
/// addressable by name.
pub(crate) fn announce_online(ctx: &mut Context<'_>) {
    if ctx.session.announced_online {
        return;
    }
    if let Some(nickname) = ctx.session.display_name() {
        ctx.session.announced_online = true;
        ctx.hub
            .broker
            .broadcast_all(&Message::ServerPresence(ServerPresence {
                nickname,
                online: true,
            }));
    }
}

/// Nickname syntax shared by SET_NICKNAME and REGISTER_USER.
pub(crate) fn validate_nickname(nickname: &str) -> Result<(), crate::error::HandlerError> {
    if nickname.is_empty() || nickname.len() > 32 {
        return Err(crate::error::HandlerError::InvalidNickname(
            "nickname must be 1-32 characters".into(),
        ));
    }
    let ok = nickname
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !ok {
        return Err(crate::error::HandlerError::InvalidNickname(
            "nickname may contain only letters, digits, '-' and '_'".into(),
        ));
    }
    Ok(())
}
