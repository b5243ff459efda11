//! Directory protocol handlers.
//!
//! Chat-only servers ignore REGISTER_SERVER entirely and answer
//! LIST_SERVERS with an empty list. Verification runs in a spawned task so
//! the 10-second back-connection deadline never stalls this session's
//! reader; the REGISTER_ACK is enqueued when the challenge resolves.

use std::sync::Arc;

use superchat_proto::messages::{
    Heartbeat, HeartbeatAck, ListServers, Message, RegisterAck, RegisterServer, ServerList,
    VerifyRegistration, VerifyResponse,
};
use tracing::{debug, info, warn};

use crate::error::{HandlerError, HandlerResult};
use crate::hub::now_ms;
use crate::session::Context;

pub async fn list_servers(ctx: &mut Context<'_>, _msg: ListServers) -> HandlerResult {
    let servers = if ctx.hub.directory.enabled {
        ctx.hub.directory.registry.snapshot()
    } else {
        Vec::new()
    };
    ctx.send(&Message::ServerList(ServerList { servers }));
    Ok(())
}

pub async fn register_server(ctx: &mut Context<'_>, msg: RegisterServer) -> HandlerResult {
    if !ctx.hub.directory.enabled {
        // Chat-only mode ignores announcements outright.
        debug!("REGISTER_SERVER ignored (chat-only mode)");
        return Ok(());
    }
    if !ctx
        .hub
        .limits
        .check_directory_registration(ctx.session.remote_ip)
    {
        return Err(HandlerError::DirectoryRateExceeded);
    }
    if msg.hostname.is_empty() || msg.port == 0 {
        return Err(HandlerError::Validation(
            "registration requires a reachable hostname and port".into(),
        ));
    }

    let hub = Arc::clone(ctx.hub);
    let handle = ctx.session.handle.clone();
    tokio::spawn(async move {
        let ack = match crate::directory::verify_server(&msg.hostname, msg.port).await {
            Ok(()) => {
                let interval = hub.directory.assigned_interval();
                hub.directory.registry.upsert(&msg, now_ms(), interval);
                crate::metrics::DIRECTORY_ENTRIES.set(hub.directory.registry.len() as i64);
                info!(host = %msg.hostname, port = msg.port, interval, "Server registered");
                RegisterAck {
                    success: true,
                    heartbeat_interval: interval,
                    message: None,
                }
            }
            Err(e) => {
                warn!(host = %msg.hostname, port = msg.port, error = %e, "Server verification failed");
                RegisterAck {
                    success: false,
                    heartbeat_interval: 0,
                    message: Some("Could not verify server".into()),
                }
            }
        };
        handle.enqueue_message(&Message::RegisterAck(ack));
    });
    Ok(())
}

pub async fn heartbeat(ctx: &mut Context<'_>, msg: Heartbeat) -> HandlerResult {
    if !ctx.hub.directory.enabled {
        return Ok(());
    }
    match ctx.hub.directory.registry.heartbeat(&msg, now_ms()) {
        Some(interval) => {
            ctx.send(&Message::HeartbeatAck(HeartbeatAck {
                heartbeat_interval: interval,
            }));
            Ok(())
        }
        None => Err(HandlerError::TargetNotFound(format!(
            "{}:{} is not registered",
            msg.hostname, msg.port
        ))),
    }
}

/// A directory is probing this server's identity over a back-connection;
/// echo the nonce regardless of mode.
pub async fn verify_registration(ctx: &mut Context<'_>, msg: VerifyRegistration) -> HandlerResult {
    ctx.send(&Message::VerifyResponse(VerifyResponse {
        challenge: msg.challenge,
    }));
    Ok(())
}
