//! Frame dispatch.
//!
//! Maps decoded payloads to handler functions, converts typed handler
//! errors into ERROR frames, and contains handler panics (logged, reported
//! as ERROR 9000, session kept alive).

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use superchat_proto::messages::{ErrorMessage, Message};
use superchat_proto::{ErrorCode, Frame, MessageType, PROTOCOL_VERSION};
use tracing::{debug, error, warn};

use crate::error::{HandlerError, HandlerResult};
use crate::handlers;
use crate::hub::Hub;
use crate::session::Session;

/// What the event loop does after a frame is processed.
#[derive(Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Continue,
    /// Close the session; `Some` carries a DISCONNECT reason still to send.
    Close(Option<String>),
}

/// Handler context: the hub plus this session's mutable state.
pub struct Context<'a> {
    pub hub: &'a Arc<Hub>,
    pub session: &'a mut Session,
    /// Flags of the frame being processed (encryption bit matters).
    pub frame_flags: u8,
}

impl Context<'_> {
    /// Queue a reply on this session's writer.
    pub fn send(&self, msg: &Message) {
        self.session.handle.enqueue_message(msg);
    }

    /// Queue a raw frame (used for encrypted passthrough).
    pub fn send_frame(&self, frame: Frame) {
        self.session.handle.enqueue(frame);
    }
}

/// Process one inbound frame.
pub async fn dispatch(hub: &Arc<Hub>, session: &mut Session, frame: Frame) -> DispatchOutcome {
    crate::metrics::FRAMES_RECEIVED.inc();

    // Version gate: wrong versions get ERROR 1001 and the connection stays
    // open so the client can downgrade.
    if frame.version != PROTOCOL_VERSION {
        report(
            session,
            &HandlerError::VersionMismatch(frame.version),
        );
        return DispatchOutcome::Continue;
    }

    let msg = match frame.message() {
        Ok(msg) => msg,
        Err(e) => {
            // Undecodable payloads are protocol violations: 1002, close.
            warn!(session = session.id, error = %e, "Malformed payload");
            report(session, &HandlerError::Malformed(e.to_string()));
            return DispatchOutcome::Close(None);
        }
    };

    if let Message::Disconnect(_) = msg {
        debug!(session = session.id, "Client disconnect");
        return DispatchOutcome::Close(None);
    }

    let mut ctx = Context {
        hub,
        session,
        frame_flags: frame.flags,
    };

    let result = AssertUnwindSafe(handle_message(&mut ctx, msg))
        .catch_unwind()
        .await;

    match result {
        Ok(Ok(())) => DispatchOutcome::Continue,
        Ok(Err(e)) => {
            report(session, &e);
            if e.is_fatal() {
                DispatchOutcome::Close(None)
            } else {
                DispatchOutcome::Continue
            }
        }
        Err(panic) => {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(session = session.id, panic = %detail, "Handler panicked");
            report(session, &HandlerError::Internal("handler failure".into()));
            DispatchOutcome::Continue
        }
    }
}

/// Send an ERROR frame for a handler failure.
fn report(session: &Session, err: &HandlerError) {
    crate::metrics::ERRORS_SENT
        .with_label_values(&[err.metric_label()])
        .inc();
    session
        .handle
        .enqueue_message(&Message::Error(err.to_error_message()));
}

async fn handle_message(ctx: &mut Context<'_>, msg: Message) -> HandlerResult {
    match msg {
        // Session control
        Message::Ping(m) => handlers::control::ping(ctx, m).await,

        // Authentication and identity
        Message::AuthRequest(m) => handlers::auth::auth_request(ctx, m).await,
        Message::SetNickname(m) => handlers::auth::set_nickname(ctx, m).await,
        Message::RegisterUser(m) => handlers::auth::register_user(ctx, m).await,
        Message::Logout(m) => handlers::auth::logout(ctx, m).await,
        Message::ChangePassword(m) => handlers::auth::change_password(ctx, m).await,

        // Channels
        Message::ListChannels(m) => handlers::channels::list_channels(ctx, m).await,
        Message::JoinChannel(m) => handlers::channels::join_channel(ctx, m).await,
        Message::LeaveChannel(m) => handlers::channels::leave_channel(ctx, m).await,
        Message::CreateChannel(m) => handlers::channels::create_channel(ctx, m).await,
        Message::CreateSubchannel(m) => handlers::channels::create_subchannel(ctx, m).await,
        Message::GetSubchannels(m) => handlers::channels::get_subchannels(ctx, m).await,
        Message::ListChannelUsers(m) => handlers::channels::list_channel_users(ctx, m).await,
        Message::DeleteChannel(m) => handlers::channels::delete_channel(ctx, m).await,

        // Messages
        Message::ListMessages(m) => handlers::messages::list_messages(ctx, m).await,
        Message::PostMessage(m) => handlers::messages::post_message(ctx, m).await,
        Message::EditMessage(m) => handlers::messages::edit_message(ctx, m).await,
        Message::DeleteMessage(m) => handlers::messages::delete_message(ctx, m).await,

        // Users and SSH keys
        Message::GetUserInfo(m) => handlers::users::get_user_info(ctx, m).await,
        Message::ListUsers(m) => handlers::users::list_users(ctx, m).await,
        Message::DeleteUser(m) => handlers::users::delete_user(ctx, m).await,
        Message::AddSshKey(m) => handlers::ssh_keys::add_ssh_key(ctx, m).await,
        Message::UpdateSshKeyLabel(m) => handlers::ssh_keys::update_label(ctx, m).await,
        Message::DeleteSshKey(m) => handlers::ssh_keys::delete_ssh_key(ctx, m).await,
        Message::ListSshKeys(m) => handlers::ssh_keys::list_ssh_keys(ctx, m).await,

        // Read state and subscriptions
        Message::GetUnreadCounts(m) => handlers::read_state::get_unread_counts(ctx, m).await,
        Message::UpdateReadState(m) => handlers::read_state::update_read_state(ctx, m).await,
        Message::SubscribeThread(m) => handlers::subscriptions::subscribe_thread(ctx, m).await,
        Message::UnsubscribeThread(m) => handlers::subscriptions::unsubscribe_thread(ctx, m).await,
        Message::SubscribeChannel(m) => handlers::subscriptions::subscribe_channel(ctx, m).await,
        Message::UnsubscribeChannel(m) => {
            handlers::subscriptions::unsubscribe_channel(ctx, m).await
        }

        // Direct messages
        Message::StartDm(m) => handlers::dm::start_dm(ctx, m).await,
        Message::ProvidePublicKey(m) => handlers::dm::provide_public_key(ctx, m).await,
        Message::AllowUnencrypted(m) => handlers::dm::allow_unencrypted(ctx, m).await,

        // Directory
        Message::ListServers(m) => handlers::directory::list_servers(ctx, m).await,
        Message::RegisterServer(m) => handlers::directory::register_server(ctx, m).await,
        Message::Heartbeat(m) => handlers::directory::heartbeat(ctx, m).await,
        Message::VerifyRegistration(m) => handlers::directory::verify_registration(ctx, m).await,
        // A VERIFY_RESPONSE only means something on the directory's own
        // back-connection, which is not a session. Ignore it here.
        Message::VerifyResponse(_) => Ok(()),

        // Moderation
        Message::BanUser(m) => handlers::moderation::ban_user(ctx, m).await,
        Message::BanIp(m) => handlers::moderation::ban_ip(ctx, m).await,
        Message::Unban(m) => handlers::moderation::unban(ctx, m).await,
        Message::ListBans(m) => handlers::moderation::list_bans(ctx, m).await,

        // Server-to-client types arriving inbound are protocol misuse.
        other => Err(HandlerError::Unsupported(format!(
            "unexpected message type {:?}",
            MessageType::code(other.msg_type())
        ))),
    }
}

/// Build the ERROR frame for transport-level failures (oversized frame,
/// undecodable framing) that bypass the normal handler path.
pub fn frame_error_message(code: ErrorCode, detail: &str) -> Message {
    Message::Error(ErrorMessage::new(code, detail))
}
