//! Authentication, nickname, registration, and credential handlers.

use std::time::Duration;

use superchat_proto::messages::{
    AuthRequest, AuthResponse, ChangePassword, Logout, LogoutResponse, Message, NicknameResponse,
    PasswordChanged, RegisterResponse, RegisterUser, SetNickname,
};
use tracing::info;

use super::{announce_online, validate_nickname};
use crate::error::{HandlerError, HandlerResult};
use crate::hub::now_ms;
use crate::security::password;
use crate::session::{admin_status, AuthedUser, Context, MAX_AUTH_FAILURES};

/// Delay applied before an attempt, exponential after the second failure.
fn backoff_for(failures: u8) -> Option<Duration> {
    match failures {
        0 | 1 => None,
        2 => Some(Duration::from_secs(1)),
        3 => Some(Duration::from_secs(2)),
        4 => Some(Duration::from_secs(4)),
        _ => Some(Duration::from_secs(8)),
    }
}

/// Record a failure and answer AUTH_RESPONSE{success=false}.
fn auth_failed(ctx: &mut Context<'_>, detail: &str) {
    ctx.session.auth_failures = ctx.session.auth_failures.saturating_add(1);
    ctx.send(&Message::AuthResponse(AuthResponse {
        success: false,
        user_id: None,
        nickname: None,
        is_admin: false,
        message: Some(detail.to_string()),
    }));
}

pub async fn auth_request(ctx: &mut Context<'_>, msg: AuthRequest) -> HandlerResult {
    if ctx.session.auth_locked() {
        return Err(HandlerError::TooManyAuthAttempts);
    }
    if let Some(delay) = backoff_for(ctx.session.auth_failures) {
        tokio::time::sleep(delay).await;
    }

    let now = now_ms();

    let Some(user) = ctx.hub.repo.user_by_nickname(&msg.nickname).await? else {
        auth_failed(ctx, "Invalid credentials");
        return Ok(());
    };
    let Some(stored) = user.password_hash.clone() else {
        auth_failed(ctx, "Account has no password; use an SSH key");
        return Ok(());
    };
    if !password::verify(&msg.password_hash, &stored) {
        auth_failed(ctx, "Invalid credentials");
        if ctx.session.auth_failures >= MAX_AUTH_FAILURES {
            info!(session = ctx.session.id, "Session locked to anonymous after repeated auth failures");
        }
        return Ok(());
    }

    // Gate 2: user bans fail authentication; shadowbans pass through.
    if let Some(verdict) = ctx
        .hub
        .bans
        .check_user(Some(user.id), Some(&user.nickname), now)
    {
        if !verdict.shadow {
            auth_failed(ctx, &format!("Banned: {}", verdict.reason));
            return Ok(());
        }
    }

    let is_admin = admin_status(ctx.hub, &user);
    ctx.session.auth_failures = 0;
    ctx.session.nickname = Some(user.nickname.clone());
    ctx.session.user = Some(AuthedUser {
        id: user.id,
        nickname: user.nickname.clone(),
        is_admin,
    });
    ctx.session.sync_shared();

    ctx.send(&Message::AuthResponse(AuthResponse {
        success: true,
        user_id: Some(user.id),
        nickname: Some(user.nickname.clone()),
        is_admin,
        message: None,
    }));
    announce_online(ctx);
    info!(session = ctx.session.id, user = %user.nickname, "Authenticated");
    Ok(())
}

pub async fn set_nickname(ctx: &mut Context<'_>, msg: SetNickname) -> HandlerResult {
    validate_nickname(&msg.nickname)?;

    let holder = ctx.hub.repo.user_by_nickname(&msg.nickname).await?;
    match (&ctx.session.user, holder) {
        // Registered nicknames are gated behind authentication.
        (None, Some(_)) => {
            ctx.send(&Message::NicknameResponse(NicknameResponse {
                success: false,
                message: Some("Nickname registered, password required".into()),
            }));
            return Ok(());
        }
        (Some(me), Some(owner)) if owner.id != me.id => {
            ctx.send(&Message::NicknameResponse(NicknameResponse {
                success: false,
                message: Some("Nickname registered to another user".into()),
            }));
            return Ok(());
        }
        // Authenticated rename: past and future displays follow the user
        // row, so this is a single repository update.
        (Some(me), _) => {
            let me_id = me.id;
            let updated = ctx.hub.repo.update_nickname(me_id, &msg.nickname).await?;
            if let Some(user) = ctx.session.user.as_mut() {
                user.nickname = updated.nickname.clone();
            }
            ctx.session.nickname = Some(updated.nickname);
        }
        (None, None) => {
            ctx.session.nickname = Some(msg.nickname);
        }
    }

    ctx.session.sync_shared();
    ctx.send(&Message::NicknameResponse(NicknameResponse {
        success: true,
        message: None,
    }));
    announce_online(ctx);
    Ok(())
}

pub async fn register_user(ctx: &mut Context<'_>, msg: RegisterUser) -> HandlerResult {
    validate_nickname(&msg.nickname)?;
    let stored = password::store_hash(&msg.password_hash)
        .map_err(|e| HandlerError::Internal(e.to_string()))?;

    // The repository enforces uniqueness; the loser of a concurrent
    // registration race surfaces here as NicknameTaken (ERROR 6004).
    let user = ctx
        .hub
        .repo
        .create_user(&msg.nickname, Some(stored), 0, now_ms())
        .await?;

    let is_admin = admin_status(ctx.hub, &user);
    ctx.session.nickname = Some(user.nickname.clone());
    ctx.session.user = Some(AuthedUser {
        id: user.id,
        nickname: user.nickname.clone(),
        is_admin,
    });
    ctx.session.sync_shared();

    ctx.send(&Message::RegisterResponse(RegisterResponse {
        success: true,
        user_id: Some(user.id),
        message: None,
    }));
    announce_online(ctx);
    info!(user = %user.nickname, id = user.id, "User registered");
    Ok(())
}

pub async fn logout(ctx: &mut Context<'_>, _msg: Logout) -> HandlerResult {
    let was_authenticated = ctx.session.user.take().is_some();
    ctx.session.nickname = None;
    ctx.session.sync_shared();
    ctx.send(&Message::LogoutResponse(LogoutResponse {
        success: was_authenticated,
    }));
    Ok(())
}

pub async fn change_password(ctx: &mut Context<'_>, msg: ChangePassword) -> HandlerResult {
    let me = ctx.session.require_user()?.clone();
    let user = ctx
        .hub
        .repo
        .user_by_id(me.id)
        .await?
        .ok_or(HandlerError::RegistrationRequired)?;

    if let Some(stored) = &user.password_hash {
        let verified = msg
            .old_password_hash
            .map(|old| password::verify(&old, stored))
            .unwrap_or(false);
        if !verified {
            ctx.send(&Message::PasswordChanged(PasswordChanged {
                success: false,
                message: Some("Current password incorrect".into()),
            }));
            return Ok(());
        }
    }

    match msg.new_password_hash {
        Some(new_hash) => {
            let stored = password::store_hash(&new_hash)
                .map_err(|e| HandlerError::Internal(e.to_string()))?;
            ctx.hub.repo.update_password(me.id, Some(stored)).await?;
        }
        None => {
            // Password removal is only safe for key-holding accounts.
            if ctx.hub.repo.count_ssh_keys(me.id).await? == 0 {
                ctx.send(&Message::PasswordChanged(PasswordChanged {
                    success: false,
                    message: Some("Cannot remove password without an SSH key".into()),
                }));
                return Ok(());
            }
            ctx.hub.repo.update_password(me.id, None).await?;
        }
    }

    ctx.send(&Message::PasswordChanged(PasswordChanged {
        success: true,
        message: None,
    }));
    Ok(())
}
