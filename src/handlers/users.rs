//! User lookup and admin user-deletion handlers.

use superchat_proto::messages::{
    DeleteUser, GetUserInfo, ListUsers, Message, UserDeleted, UserInfo, UserList,
};
use tracing::info;

use crate::error::{HandlerError, HandlerResult};
use crate::repo::RepoError;
use crate::session::Context;

pub async fn get_user_info(ctx: &mut Context<'_>, msg: GetUserInfo) -> HandlerResult {
    let nickname = msg.nickname.trim_start_matches('~');
    let user = ctx.hub.repo.user_by_nickname(nickname).await?;

    let response = match user {
        Some(user) => Message::UserInfo(UserInfo {
            found: true,
            anonymous_online: false,
            user: Some(user.entry(ctx.hub.broker.user_online(user.id))),
        }),
        None => {
            let anonymous_online = ctx
                .hub
                .broker
                .sessions_with_nickname(&format!("~{nickname}"))
                .iter()
                .any(|h| h.shared.user_id().is_none());
            Message::UserInfo(UserInfo {
                found: false,
                user: None,
                anonymous_online,
            })
        }
    };
    ctx.send(&response);
    Ok(())
}

pub async fn list_users(ctx: &mut Context<'_>, _msg: ListUsers) -> HandlerResult {
    let users = ctx.hub.repo.list_users().await?;
    let entries = users
        .iter()
        .map(|u| u.entry(ctx.hub.broker.user_online(u.id)))
        .collect();
    ctx.send(&Message::UserList(UserList { users: entries }));
    Ok(())
}

/// Admin-only. One logical transaction in the repository (authorship
/// NULLed, SSH keys, bans, and read state cascaded), then live sessions
/// of the deleted user are closed and everyone is told.
pub async fn delete_user(ctx: &mut Context<'_>, msg: DeleteUser) -> HandlerResult {
    ctx.session.require_admin()?;

    let user = ctx.hub.repo.delete_user(msg.user_id).await.map_err(|e| match e {
        RepoError::UserNotFound => HandlerError::UserNotFound(format!("user {}", msg.user_id)),
        other => other.into(),
    })?;

    for handle in ctx.hub.broker.sessions_of_user(user.id) {
        handle.close("account deleted");
    }
    ctx.hub.bans.reload(crate::hub::now_ms()).await?;

    info!(user = %user.nickname, id = user.id, "User deleted");
    ctx.hub
        .broker
        .broadcast_all(&Message::UserDeleted(UserDeleted {
            user_id: user.id,
            nickname: user.nickname,
        }));
    Ok(())
}
