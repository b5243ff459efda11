//! Admin moderation handlers.

use superchat_proto::messages::{
    BanIp, BanList, BanResponse, BanUser, ListBans, Message, Unban,
};
use tracing::info;

use crate::error::{HandlerError, HandlerResult};
use crate::hub::now_ms;
use crate::repo::{BanKind, NewBan, RepoError};
use crate::security::BanEnforcer;
use crate::session::Context;

fn until_from_hours(now: i64, duration_hours: Option<u32>) -> Option<i64> {
    duration_hours.map(|h| now + i64::from(h) * 3_600_000)
}

fn ban_response(ban_id: Option<u64>) -> Message {
    Message::BanResponse(BanResponse {
        success: true,
        ban_id,
        message: None,
    })
}

pub async fn ban_user(ctx: &mut Context<'_>, msg: BanUser) -> HandlerResult {
    let admin = ctx.session.require_admin()?.clone();
    let now = now_ms();

    let target = ctx.hub.repo.user_by_nickname(&msg.nickname).await?;
    let ban = ctx
        .hub
        .repo
        .add_ban(NewBan {
            kind: BanKind::User,
            user_id: target.as_ref().map(|u| u.id),
            nickname: Some(msg.nickname.clone()),
            ip_or_cidr: None,
            reason: msg.reason.clone(),
            shadow: msg.shadowban,
            banned_at: now,
            banned_until: until_from_hours(now, msg.duration_hours),
            banned_by: admin.nickname.clone(),
        })
        .await?;
    ctx.hub.bans.reload(now).await?;

    // Hard bans evict live sessions; shadowbans must stay invisible.
    if !msg.shadowban {
        if let Some(user) = &target {
            for handle in ctx.hub.broker.sessions_of_user(user.id) {
                handle.close("banned");
            }
        }
        for handle in ctx.hub.broker.sessions_with_nickname(&format!("~{}", msg.nickname)) {
            handle.close("banned");
        }
    }

    info!(target = %msg.nickname, shadow = msg.shadowban, by = %admin.nickname, "User banned");
    ctx.send(&ban_response(Some(ban.id)));
    Ok(())
}

pub async fn ban_ip(ctx: &mut Context<'_>, msg: BanIp) -> HandlerResult {
    let admin = ctx.session.require_admin()?.clone();
    let now = now_ms();

    let Some(net) = BanEnforcer::parse_ip_rule(&msg.ip_or_cidr) else {
        return Err(HandlerError::Validation(format!(
            "'{}' is not an IP address or CIDR block",
            msg.ip_or_cidr
        )));
    };

    let ban = ctx
        .hub
        .repo
        .add_ban(NewBan {
            kind: BanKind::Ip,
            user_id: None,
            nickname: None,
            ip_or_cidr: Some(msg.ip_or_cidr.clone()),
            reason: msg.reason.clone(),
            shadow: false,
            banned_at: now,
            banned_until: until_from_hours(now, msg.duration_hours),
            banned_by: admin.nickname.clone(),
        })
        .await?;
    ctx.hub.bans.reload(now).await?;

    // Evict every live session inside the banned range.
    let mut evicted = 0usize;
    for session_id in ctx.hub.broker.session_ids() {
        if let Some(handle) = ctx.hub.broker.session(session_id) {
            if net.contains(&handle.shared.remote_ip) {
                handle.close("banned");
                evicted += 1;
            }
        }
    }

    info!(rule = %msg.ip_or_cidr, evicted, by = %admin.nickname, "IP ban placed");
    ctx.send(&ban_response(Some(ban.id)));
    Ok(())
}

pub async fn unban(ctx: &mut Context<'_>, msg: Unban) -> HandlerResult {
    ctx.session.require_admin()?;
    let ban = ctx.hub.repo.remove_ban(msg.ban_id).await.map_err(|e| match e {
        RepoError::BanNotFound => HandlerError::TargetNotFound(format!("ban {}", msg.ban_id)),
        other => other.into(),
    })?;
    ctx.hub.bans.reload(now_ms()).await?;
    info!(ban = ban.id, "Ban lifted");
    ctx.send(&ban_response(Some(ban.id)));
    Ok(())
}

pub async fn list_bans(ctx: &mut Context<'_>, msg: ListBans) -> HandlerResult {
    ctx.session.require_admin()?;
    let bans = ctx
        .hub
        .repo
        .list_bans(msg.include_expired, now_ms())
        .await?;
    ctx.send(&Message::BanList(BanList {
        bans: bans.iter().map(|b| b.info()).collect(),
    }));
    Ok(())
}
