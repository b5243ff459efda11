//! Keepalive.

use std::time::Instant;

use superchat_proto::messages::{Message, Ping, Pong};

use crate::error::HandlerResult;
use crate::session::Context;

/// PING is the only message that advances the idle timer.
pub async fn ping(ctx: &mut Context<'_>, msg: Ping) -> HandlerResult {
    ctx.session.last_ping = Instant::now();
    ctx.send(&Message::Pong(Pong {
        timestamp: msg.timestamp,
    }));
    Ok(())
}
