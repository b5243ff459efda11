//! Channel and thread subscription handlers.
//!
//! Subscriptions are independent of roster membership: a session may
//! subscribe without joining and vice versa. Caps come from SERVER_CONFIG.

use superchat_proto::messages::{
    subscribe_target, Message, SubscribeChannel, SubscribeOk, SubscribeThread, UnsubscribeChannel,
    UnsubscribeThread,
};

use crate::error::{HandlerError, HandlerResult};
use crate::session::Context;

use super::channels::visible_channel;

fn subscribe_ok(target_type: u8, id: u64, subchannel_id: Option<u64>, subscribed: bool) -> Message {
    Message::SubscribeOk(SubscribeOk {
        target_type,
        id,
        subchannel_id,
        subscribed,
    })
}

pub async fn subscribe_channel(ctx: &mut Context<'_>, msg: SubscribeChannel) -> HandlerResult {
    let channel = visible_channel(ctx, msg.channel_id).await?;

    let cap = ctx.hub.config.limits.max_channel_subs as usize;
    if !ctx.session.subscribed_channels.contains(&channel.id)
        && ctx.session.subscribed_channels.len() >= cap
    {
        return Err(HandlerError::SubscriptionCap("channel subscriptions"));
    }

    ctx.session.subscribed_channels.insert(channel.id);
    ctx.hub.broker.subscribe_channel(channel.id, ctx.session.id);
    ctx.send(&subscribe_ok(
        subscribe_target::CHANNEL,
        channel.id,
        msg.subchannel_id,
        true,
    ));
    Ok(())
}

pub async fn unsubscribe_channel(ctx: &mut Context<'_>, msg: UnsubscribeChannel) -> HandlerResult {
    ctx.session.subscribed_channels.remove(&msg.channel_id);
    ctx.hub.broker.unsubscribe_channel(msg.channel_id, ctx.session.id);
    ctx.send(&subscribe_ok(
        subscribe_target::CHANNEL,
        msg.channel_id,
        None,
        false,
    ));
    Ok(())
}

pub async fn subscribe_thread(ctx: &mut Context<'_>, msg: SubscribeThread) -> HandlerResult {
    let channel = visible_channel(ctx, msg.channel_id).await?;

    let root = ctx
        .hub
        .repo
        .message_by_id(channel.id, msg.thread_root_id)
        .await?
        .ok_or(HandlerError::MessageNotFound(msg.thread_root_id))?;
    if root.parent_id.is_some() {
        return Err(HandlerError::Validation(
            "thread subscriptions attach to the root message".into(),
        ));
    }

    let cap = ctx.hub.config.limits.max_thread_subs as usize;
    if !ctx.session.subscribed_threads.contains_key(&root.id)
        && ctx.session.subscribed_threads.len() >= cap
    {
        return Err(HandlerError::SubscriptionCap("thread subscriptions"));
    }

    ctx.session.subscribed_threads.insert(root.id, channel.id);
    ctx.hub.broker.subscribe_thread(root.id, ctx.session.id);
    ctx.send(&subscribe_ok(subscribe_target::THREAD, root.id, None, true));
    Ok(())
}

pub async fn unsubscribe_thread(ctx: &mut Context<'_>, msg: UnsubscribeThread) -> HandlerResult {
    ctx.session.subscribed_threads.remove(&msg.thread_root_id);
    ctx.hub
        .broker
        .unsubscribe_thread(msg.thread_root_id, ctx.session.id);
    ctx.send(&subscribe_ok(
        subscribe_target::THREAD,
        msg.thread_root_id,
        None,
        false,
    ));
    Ok(())
}
