//! DM negotiation handlers; state lives in the orchestrator.

use superchat_proto::messages::{AllowUnencrypted, ProvidePublicKey, StartDm};

use crate::dm::Party;
use crate::error::HandlerResult;
use crate::session::Context;

fn party(ctx: &Context<'_>) -> Result<Party, crate::error::HandlerError> {
    Ok(Party {
        session_id: ctx.session.id,
        user_id: ctx.session.user.as_ref().map(|u| u.id),
        nickname: ctx.session.require_display_name()?,
    })
}

pub async fn start_dm(ctx: &mut Context<'_>, msg: StartDm) -> HandlerResult {
    let initiator = party(ctx)?;
    ctx.hub
        .dm
        .start_dm(ctx.hub, initiator, msg.target, msg.allow_unencrypted)
        .await
}

pub async fn provide_public_key(ctx: &mut Context<'_>, msg: ProvidePublicKey) -> HandlerResult {
    let me = party(ctx)?;
    ctx.hub
        .dm
        .provide_public_key(ctx.hub, me, msg.invite_id, msg.public_key)
        .await
}

pub async fn allow_unencrypted(ctx: &mut Context<'_>, msg: AllowUnencrypted) -> HandlerResult {
    let me = party(ctx)?;
    ctx.hub
        .dm
        .allow_unencrypted(ctx.hub, me, msg.invite_id, msg.permanent)
        .await
}
