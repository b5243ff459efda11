//! Channel and subchannel handlers.

use superchat_proto::messages::{
    ChannelCreated, ChannelDeleted, ChannelList, ChannelPresence, ChannelUserList, CreateChannel,
    CreateSubchannel, DeleteChannel, GetSubchannels, JoinChannel, JoinResponse, LeaveChannel,
    LeaveResponse, ListChannelUsers, ListChannels, Message, SubchannelCreated, SubchannelList,
};
use tracing::info;

use crate::error::{HandlerError, HandlerResult};
use crate::hub::now_ms;
use crate::repo::{Channel, ChannelType, RepoError};
use crate::session::Context;

fn validate_channel_name(name: &str) -> Result<(), HandlerError> {
    if name.is_empty() || name.len() > 64 {
        return Err(HandlerError::Validation(
            "channel name must be 1-64 characters".into(),
        ));
    }
    let ok = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !ok {
        return Err(HandlerError::Validation(
            "channel name may contain only letters, digits, '-' and '_'".into(),
        ));
    }
    Ok(())
}

/// Channel lookup for client operations. DM channels are only visible to
/// their participants; to everyone else they do not exist.
pub(crate) async fn visible_channel(
    ctx: &Context<'_>,
    channel_id: u64,
) -> Result<Channel, HandlerError> {
    let channel = ctx
        .hub
        .repo
        .channel_by_id(channel_id)
        .await?
        .ok_or(HandlerError::ChannelNotFound(channel_id))?;
    if channel.is_dm
        && !ctx
            .hub
            .broker
            .channel_subscribers(channel.id)
            .contains(&ctx.session.id)
    {
        return Err(HandlerError::ChannelNotFound(channel_id));
    }
    Ok(channel)
}

pub async fn list_channels(ctx: &mut Context<'_>, _msg: ListChannels) -> HandlerResult {
    let channels = ctx.hub.repo.list_channels().await?;
    ctx.send(&Message::ChannelList(ChannelList {
        channels: channels.iter().map(|c| c.info()).collect(),
    }));
    Ok(())
}

pub async fn join_channel(ctx: &mut Context<'_>, msg: JoinChannel) -> HandlerResult {
    let channel = visible_channel(ctx, msg.channel_id).await?;
    if let Some(sub_id) = msg.subchannel_id {
        let valid = ctx
            .hub
            .repo
            .subchannel_by_id(sub_id)
            .await?
            .is_some_and(|s| s.channel_id == channel.id);
        if !valid {
            return Err(HandlerError::SubchannelNotFound(sub_id));
        }
    }

    // Presence goes to the members who were already there.
    if let Some(nickname) = ctx.session.display_name() {
        ctx.hub.broker.send_to_roster(
            channel.id,
            &Message::ChannelPresence(ChannelPresence {
                channel_id: channel.id,
                nickname,
                joined: true,
            }),
        );
    }

    ctx.hub.broker.join_roster(channel.id, ctx.session.id);
    ctx.session.joined_channels.insert(channel.id);
    ctx.session.active_channel = Some((channel.id, msg.subchannel_id));

    ctx.send(&Message::JoinResponse(JoinResponse {
        success: true,
        channel_id: channel.id,
        subchannel_id: msg.subchannel_id,
        message: None,
    }));
    Ok(())
}

pub async fn leave_channel(ctx: &mut Context<'_>, msg: LeaveChannel) -> HandlerResult {
    let was_member = ctx.session.joined_channels.remove(&msg.channel_id);
    ctx.hub.broker.leave_roster(msg.channel_id, ctx.session.id);
    if ctx
        .session
        .active_channel
        .is_some_and(|(id, _)| id == msg.channel_id)
    {
        ctx.session.active_channel = None;
    }

    ctx.send(&Message::LeaveResponse(LeaveResponse {
        success: was_member,
        channel_id: msg.channel_id,
    }));

    if was_member {
        if let Some(nickname) = ctx.session.display_name() {
            ctx.hub.broker.send_to_roster(
                msg.channel_id,
                &Message::ChannelPresence(ChannelPresence {
                    channel_id: msg.channel_id,
                    nickname,
                    joined: false,
                }),
            );
        }
    }
    Ok(())
}

pub async fn create_channel(ctx: &mut Context<'_>, msg: CreateChannel) -> HandlerResult {
    ctx.session.require_display_name()?;
    validate_channel_name(&msg.name)?;
    let channel_type = ChannelType::from_code(msg.channel_type)
        .ok_or_else(|| HandlerError::Validation("unknown channel type".into()))?;

    if !ctx.hub.limits.check_channel_create(ctx.session.limiter_key()) {
        return Err(HandlerError::ChannelCreateRateExceeded);
    }

    let channel = ctx
        .hub
        .repo
        .create_channel(
            &msg.name,
            &msg.description,
            channel_type,
            msg.retention_hours,
            false,
            false,
            now_ms(),
        )
        .await
        .map_err(|e| match e {
            RepoError::NameConflict(name) => {
                HandlerError::Validation(format!("channel '{name}' already exists"))
            }
            other => other.into(),
        })?;

    info!(channel = %channel.name, id = channel.id, "Channel created");
    // The broadcast doubles as the creator's acknowledgement.
    ctx.hub
        .broker
        .broadcast_all(&Message::ChannelCreated(ChannelCreated {
            channel: channel.info(),
        }));
    Ok(())
}

pub async fn create_subchannel(ctx: &mut Context<'_>, msg: CreateSubchannel) -> HandlerResult {
    ctx.session.require_display_name()?;
    validate_channel_name(&msg.name)?;
    let channel = visible_channel(ctx, msg.channel_id).await?;
    if channel.is_dm {
        return Err(HandlerError::Validation("DM channels have no subchannels".into()));
    }
    let channel_type = ChannelType::from_code(msg.channel_type)
        .ok_or_else(|| HandlerError::Validation("unknown channel type".into()))?;

    if !ctx.hub.limits.check_channel_create(ctx.session.limiter_key()) {
        return Err(HandlerError::ChannelCreateRateExceeded);
    }

    let sub = ctx
        .hub
        .repo
        .create_subchannel(
            channel.id,
            &msg.name,
            &msg.description,
            channel_type,
            msg.retention_hours,
        )
        .await
        .map_err(|e| match e {
            RepoError::NameConflict(name) => {
                HandlerError::Validation(format!("subchannel '{name}' already exists"))
            }
            other => other.into(),
        })?;

    info!(channel = channel.id, subchannel = %sub.name, "Subchannel created");
    ctx.hub
        .broker
        .broadcast_all(&Message::SubchannelCreated(SubchannelCreated {
            subchannel: sub.info(),
        }));
    Ok(())
}

pub async fn get_subchannels(ctx: &mut Context<'_>, msg: GetSubchannels) -> HandlerResult {
    let channel = visible_channel(ctx, msg.channel_id).await?;
    let subs = ctx.hub.repo.subchannels(channel.id).await?;
    ctx.send(&Message::SubchannelList(SubchannelList {
        channel_id: channel.id,
        subchannels: subs.iter().map(|s| s.info()).collect(),
    }));
    Ok(())
}

pub async fn list_channel_users(ctx: &mut Context<'_>, msg: ListChannelUsers) -> HandlerResult {
    let channel = visible_channel(ctx, msg.channel_id).await?;
    let mut nicknames: Vec<String> = ctx
        .hub
        .broker
        .roster(channel.id)
        .iter()
        .filter_map(|&sid| ctx.hub.broker.session(sid))
        .filter_map(|handle| handle.shared.nickname())
        .collect();
    nicknames.sort();
    ctx.send(&Message::ChannelUserList(ChannelUserList {
        channel_id: channel.id,
        nicknames,
    }));
    Ok(())
}

pub async fn delete_channel(ctx: &mut Context<'_>, msg: DeleteChannel) -> HandlerResult {
    ctx.session.require_admin()?;
    let channel = ctx.hub.repo.delete_channel(msg.channel_id).await.map_err(|e| {
        match e {
            RepoError::ChannelNotFound => HandlerError::ChannelNotFound(msg.channel_id),
            other => other.into(),
        }
    })?;

    ctx.hub.broker.remove_channel(channel.id, &[]);
    info!(channel = %channel.name, id = channel.id, "Channel deleted");
    ctx.hub
        .broker
        .broadcast_all(&Message::ChannelDeleted(ChannelDeleted {
            channel_id: channel.id,
        }));
    Ok(())
}
