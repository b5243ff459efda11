//! Read-state watermarks and unread counts (registered users only).

use std::collections::HashMap;

use superchat_proto::messages::{
    GetUnreadCounts, Message, ReadStateUpdated, UnreadCounts, UnreadEntry, UpdateReadState,
};

use crate::error::HandlerResult;
use crate::repo::ReadState;
use crate::session::Context;

pub async fn update_read_state(ctx: &mut Context<'_>, msg: UpdateReadState) -> HandlerResult {
    let me = ctx.session.require_user()?.clone();
    ctx.hub
        .repo
        .set_read_state(ReadState {
            user_id: me.id,
            channel_id: msg.channel_id,
            subchannel_id: msg.subchannel_id,
            last_read_at: msg.last_read_at,
        })
        .await?;

    ctx.send(&Message::ReadStateUpdated(ReadStateUpdated {
        channel_id: msg.channel_id,
        subchannel_id: msg.subchannel_id,
        last_read_at: msg.last_read_at,
    }));
    Ok(())
}

/// Counts per channel and stored subchannel watermark, plus per-thread
/// counts for the session's thread subscriptions.
pub async fn get_unread_counts(ctx: &mut Context<'_>, _msg: GetUnreadCounts) -> HandlerResult {
    let me = ctx.session.require_user()?.clone();

    let states = ctx.hub.repo.read_states(me.id).await?;
    let mut watermark: HashMap<(u64, Option<u64>), i64> = HashMap::new();
    for state in &states {
        watermark.insert((state.channel_id, state.subchannel_id), state.last_read_at);
    }
    let channel_mark =
        |channel_id: u64| watermark.get(&(channel_id, None)).copied().unwrap_or(0);

    let mut counts = Vec::new();
    for channel in ctx.hub.repo.list_channels().await? {
        let since = channel_mark(channel.id);
        let count = ctx
            .hub
            .repo
            .count_messages_since(channel.id, None, None, since)
            .await?;
        if count > 0 {
            counts.push(UnreadEntry {
                channel_id: channel.id,
                subchannel_id: None,
                thread_root_id: None,
                count,
            });
        }

        for sub in ctx.hub.repo.subchannels(channel.id).await? {
            let since = watermark
                .get(&(channel.id, Some(sub.id)))
                .copied()
                .unwrap_or(0);
            let count = ctx
                .hub
                .repo
                .count_messages_since(channel.id, Some(sub.id), None, since)
                .await?;
            if count > 0 {
                counts.push(UnreadEntry {
                    channel_id: channel.id,
                    subchannel_id: Some(sub.id),
                    thread_root_id: None,
                    count,
                });
            }
        }
    }

    // Thread-scoped counts for this session's subscriptions; the thread
    // inherits its channel watermark.
    let threads: Vec<(u64, u64)> = ctx
        .session
        .subscribed_threads
        .iter()
        .map(|(&root, &channel_id)| (root, channel_id))
        .collect();
    for (root, channel_id) in threads {
        let count = ctx
            .hub
            .repo
            .count_messages_since(channel_id, None, Some(root), channel_mark(channel_id))
            .await?;
        if count > 0 {
            counts.push(UnreadEntry {
                channel_id,
                subchannel_id: None,
                thread_root_id: Some(root),
                count,
            });
        }
    }

    ctx.send(&Message::UnreadCounts(UnreadCounts { counts }));
    Ok(())
}
