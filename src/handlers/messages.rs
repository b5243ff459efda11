//! Message posting, editing, deletion, and history handlers.
//!
//! POST_MESSAGE prerequisites run in the contract's order: shadowban
//! passthrough, display name, joined channel, content length, rate limit,
//! encryption policy. Persistence commit and fan-out enqueue happen under
//! the channel's commit lock so every recipient observes commit order.

use superchat_proto::frame::FLAG_ENCRYPTED;
use superchat_proto::messages::{
    DeleteMessage, EditMessage, ListMessages, Message, MessageDeleted, MessageEdited, MessageInfo,
    MessageList, MessagePosted, NewMessage as NewMessageEvent, PostMessage,
};

use crate::error::{HandlerError, HandlerResult};
use crate::hub::{now_ms, Hub};
use crate::repo::{MessageQuery, MessageRecord, NewMessage, RepoError};
use crate::session::Context;

use super::channels::visible_channel;

const DEFAULT_LIST_LIMIT: u16 = 50;

/// Render a stored record for the wire, resolving the display name: live
/// nickname for registered authors, frozen `~`-sigiled snapshot otherwise.
pub async fn render_message(hub: &Hub, record: &MessageRecord) -> Result<MessageInfo, HandlerError> {
    let author_nickname = match record.author_user_id {
        Some(user_id) => hub
            .repo
            .user_by_id(user_id)
            .await?
            .map(|u| u.nickname)
            .unwrap_or_else(|| "(deleted)".to_string()),
        None => format!(
            "~{}",
            record.author_nickname.as_deref().unwrap_or("anonymous")
        ),
    };
    Ok(MessageInfo {
        id: record.id,
        channel_id: record.channel_id,
        subchannel_id: record.subchannel_id,
        parent_id: record.parent_id,
        author_user_id: record.author_user_id,
        author_nickname,
        content: record.content.clone(),
        created_at: record.created_at,
        edited_at: record.edited_at,
        deleted_at: record.deleted_at,
        thread_root_id: record.thread_root_id,
        thread_depth: record.thread_depth,
        encrypted: record.encrypted,
    })
}

/// Gate 3 plus the shadowban verdict. Hard bans error; shadowbans post
/// normally and are filtered at fan-out.
fn post_gate(ctx: &Context<'_>, now: i64) -> Result<bool, HandlerError> {
    let user_id = ctx.session.user.as_ref().map(|u| u.id);
    let nickname = ctx.session.nickname.clone();
    match ctx.hub.bans.check_user(user_id, nickname.as_deref(), now) {
        Some(verdict) if verdict.shadow => Ok(true),
        Some(verdict) => Err(HandlerError::Banned(verdict.reason)),
        None => Ok(false),
    }
}

pub async fn post_message(ctx: &mut Context<'_>, msg: PostMessage) -> HandlerResult {
    let now = now_ms();
    let shadowbanned = post_gate(ctx, now)?;
    ctx.session.require_display_name()?;

    // DM participantship (checked by visible_channel) stands in for the
    // joined requirement: DM members are wired in by the orchestrator.
    let channel = visible_channel(ctx, msg.channel_id).await?;
    if !channel.is_dm && !ctx.session.joined_channels.contains(&channel.id) {
        return Err(HandlerError::Validation("join the channel before posting".into()));
    }

    let encrypted = ctx.frame_flags & FLAG_ENCRYPTED != 0;
    if encrypted && !channel.is_dm {
        return Err(HandlerError::Validation(
            "encrypted payloads are only valid in DM channels".into(),
        ));
    }
    if !encrypted {
        let limit = ctx.hub.config.limits.max_message_length as usize;
        if msg.content.len() > limit {
            return Err(HandlerError::MessageTooLong {
                actual: msg.content.len(),
                limit,
            });
        }
        if std::str::from_utf8(&msg.content).is_err() {
            return Err(HandlerError::Validation("message content must be UTF-8".into()));
        }
    }

    if !ctx.hub.limits.check_message(ctx.session.limiter_key()) {
        return Err(HandlerError::MessageRateExceeded);
    }

    let new = NewMessage {
        channel_id: channel.id,
        subchannel_id: msg.subchannel_id,
        parent_id: msg.parent_id,
        author_user_id: ctx.session.user.as_ref().map(|u| u.id),
        author_nickname: match &ctx.session.user {
            Some(_) => None,
            None => ctx.session.nickname.clone(),
        },
        content: msg.content,
        encrypted,
        created_at: now,
    };

    // Commit and fan-out under the channel lock: recipients see commit
    // order, and the subscriber snapshot is taken atomically with it.
    let order = ctx.hub.broker.channel_order(channel.id);
    let guard = order.lock().await;

    let record = ctx.hub.repo.create_message(new).await.map_err(|e| match e {
        RepoError::MessageNotFound => {
            HandlerError::MessageNotFound(msg.parent_id.unwrap_or_default())
        }
        RepoError::SubchannelNotFound => {
            HandlerError::SubchannelNotFound(msg.subchannel_id.unwrap_or_default())
        }
        other => other.into(),
    })?;
    crate::metrics::MESSAGES_POSTED.inc();

    ctx.send(&Message::MessagePosted(MessagePosted {
        success: true,
        message_id: Some(record.id),
        message: None,
    }));

    let info = render_message(ctx.hub, &record).await?;
    let event = Message::NewMessage(NewMessageEvent { message: info });
    let frame = if encrypted {
        event.to_encrypted_frame()
    } else {
        event.to_frame()
    };
    ctx.hub.broker.fanout_message(
        channel.id,
        record.parent_id.map(|_| record.thread_root_id),
        ctx.session.id,
        shadowbanned,
        frame,
    );
    drop(guard);
    Ok(())
}

/// Author-or-admin check shared by edit and delete. Anonymous messages
/// have no durable author identity, so only admins may touch them.
fn can_modify(ctx: &Context<'_>, record: &MessageRecord) -> bool {
    if ctx.session.is_admin() {
        return true;
    }
    match (&ctx.session.user, record.author_user_id) {
        (Some(me), Some(author)) => me.id == author,
        _ => false,
    }
}

pub async fn edit_message(ctx: &mut Context<'_>, msg: EditMessage) -> HandlerResult {
    let now = now_ms();
    let shadowbanned = post_gate(ctx, now)?;
    let channel = visible_channel(ctx, msg.channel_id).await?;

    let record = ctx
        .hub
        .repo
        .message_by_id(channel.id, msg.message_id)
        .await?
        .ok_or(HandlerError::MessageNotFound(msg.message_id))?;
    if !can_modify(ctx, &record) {
        return Err(HandlerError::NotAuthor);
    }

    if !record.encrypted {
        let limit = ctx.hub.config.limits.max_message_length as usize;
        if msg.content.len() > limit {
            return Err(HandlerError::MessageTooLong {
                actual: msg.content.len(),
                limit,
            });
        }
        if std::str::from_utf8(&msg.content).is_err() {
            return Err(HandlerError::Validation("message content must be UTF-8".into()));
        }
    }

    let order = ctx.hub.broker.channel_order(channel.id);
    let guard = order.lock().await;

    let updated = ctx
        .hub
        .repo
        .edit_message(channel.id, msg.message_id, msg.content, now)
        .await
        .map_err(|e| match e {
            RepoError::MessageNotFound => HandlerError::MessageNotFound(msg.message_id),
            other => other.into(),
        })?;

    // Same routing as the post that created the message.
    let event = Message::MessageEdited(MessageEdited {
        success: true,
        message_id: updated.id,
        content: updated.content.clone(),
        edited_at: updated.edited_at.unwrap_or(now),
        message: None,
    });
    ctx.hub.broker.fanout_message(
        channel.id,
        updated.parent_id.map(|_| updated.thread_root_id),
        ctx.session.id,
        shadowbanned,
        event.to_frame(),
    );
    ctx.send(&event);
    drop(guard);
    Ok(())
}

pub async fn delete_message(ctx: &mut Context<'_>, msg: DeleteMessage) -> HandlerResult {
    let now = now_ms();
    let shadowbanned = post_gate(ctx, now)?;
    let channel = visible_channel(ctx, msg.channel_id).await?;

    let record = ctx
        .hub
        .repo
        .message_by_id(channel.id, msg.message_id)
        .await?
        .ok_or(HandlerError::MessageNotFound(msg.message_id))?;
    if !can_modify(ctx, &record) {
        return Err(HandlerError::NotAuthor);
    }

    let order = ctx.hub.broker.channel_order(channel.id);
    let guard = order.lock().await;

    let deleted = ctx
        .hub
        .repo
        .delete_message(channel.id, msg.message_id, now)
        .await?;

    let event = Message::MessageDeleted(MessageDeleted {
        success: true,
        message_id: deleted.id,
        deleted_at: deleted.deleted_at.unwrap_or(now),
        message: None,
    });
    ctx.hub.broker.fanout_message(
        channel.id,
        deleted.parent_id.map(|_| deleted.thread_root_id),
        ctx.session.id,
        shadowbanned,
        event.to_frame(),
    );
    ctx.send(&event);
    drop(guard);
    Ok(())
}

pub async fn list_messages(ctx: &mut Context<'_>, msg: ListMessages) -> HandlerResult {
    let now = now_ms();
    let channel = visible_channel(ctx, msg.channel_id).await?;

    let limit = match msg.limit {
        0 => DEFAULT_LIST_LIMIT,
        n => n.min(200),
    };
    let records = ctx
        .hub
        .repo
        .list_messages(MessageQuery {
            channel_id: channel.id,
            subchannel_id: msg.subchannel_id,
            parent_id: msg.parent_id,
            before_id: msg.before_id,
            after_id: msg.after_id,
            limit: limit as usize,
        })
        .await
        .map_err(|e| match e {
            RepoError::MessageNotFound => {
                HandlerError::MessageNotFound(msg.parent_id.unwrap_or_default())
            }
            other => other.into(),
        })?;

    // History hides shadowbanned authors from everyone but themselves.
    let shadowed = ctx.hub.bans.shadowbanned_users(now);
    let me = ctx.session.user.as_ref().map(|u| u.id);
    let mut messages = Vec::with_capacity(records.len());
    for record in &records {
        if let Some(author) = record.author_user_id {
            if shadowed.contains(&author) && me != Some(author) {
                continue;
            }
        }
        messages.push(render_message(ctx.hub, record).await?);
    }

    ctx.send(&Message::MessageList(MessageList {
        channel_id: channel.id,
        subchannel_id: msg.subchannel_id,
        parent_id: msg.parent_id,
        messages,
    }));
    Ok(())
}
