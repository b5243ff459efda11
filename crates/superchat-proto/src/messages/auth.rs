//! Authentication, registration, and credential management payloads.

use bytes::{BufMut, Bytes, BytesMut};

use super::Wire;
use crate::error::WireError;
use crate::wire::*;

/// AUTH_REQUEST: authenticate with a nickname and the argon2id pre-hash.
///
/// The hash is `argon2id(password, salt = nickname, t = 3, m = 64 MiB,
/// p = 4, out = 32)` computed client-side; see [`crate::auth`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    /// Registered nickname.
    pub nickname: String,
    /// 32-byte argon2id output.
    pub password_hash: [u8; 32],
}

impl Wire for AuthRequest {
    fn encode(&self, buf: &mut BytesMut) {
        put_string(buf, &self.nickname);
        buf.put_slice(&self.password_hash);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            nickname: get_string(buf)?,
            password_hash: get_key32(buf)?,
        })
    }
}

/// AUTH_RESPONSE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResponse {
    /// Whether authentication succeeded.
    pub success: bool,
    /// Authenticated user id on success.
    pub user_id: Option<u64>,
    /// Canonical nickname on success.
    pub nickname: Option<String>,
    /// Whether the user holds the admin flag.
    pub is_admin: bool,
    /// Failure detail.
    pub message: Option<String>,
}

impl Wire for AuthResponse {
    fn encode(&self, buf: &mut BytesMut) {
        put_bool(buf, self.success);
        put_opt_u64(buf, self.user_id);
        put_opt_string(buf, &self.nickname);
        put_bool(buf, self.is_admin);
        put_opt_string(buf, &self.message);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            success: get_bool(buf)?,
            user_id: get_opt_u64(buf)?,
            nickname: get_opt_string(buf)?,
            is_admin: get_bool(buf)?,
            message: get_opt_string(buf)?,
        })
    }
}

/// SET_NICKNAME: claim a session nickname (anonymous or post-auth rename).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetNickname {
    /// Requested nickname.
    pub nickname: String,
}

impl Wire for SetNickname {
    fn encode(&self, buf: &mut BytesMut) {
        put_string(buf, &self.nickname);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            nickname: get_string(buf)?,
        })
    }
}

/// NICKNAME_RESPONSE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NicknameResponse {
    /// Whether the nickname was applied.
    pub success: bool,
    /// Failure detail (e.g. "Nickname registered, password required").
    pub message: Option<String>,
}

impl Wire for NicknameResponse {
    fn encode(&self, buf: &mut BytesMut) {
        put_bool(buf, self.success);
        put_opt_string(buf, &self.message);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            success: get_bool(buf)?,
            message: get_opt_string(buf)?,
        })
    }
}

/// REGISTER_USER: create an account for the current session nickname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterUser {
    /// Nickname to register.
    pub nickname: String,
    /// 32-byte argon2id output to store (bcrypt-wrapped server-side).
    pub password_hash: [u8; 32],
}

impl Wire for RegisterUser {
    fn encode(&self, buf: &mut BytesMut) {
        put_string(buf, &self.nickname);
        buf.put_slice(&self.password_hash);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            nickname: get_string(buf)?,
            password_hash: get_key32(buf)?,
        })
    }
}

/// REGISTER_RESPONSE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterResponse {
    /// Whether the account was created.
    pub success: bool,
    /// New user id on success.
    pub user_id: Option<u64>,
    /// Failure detail.
    pub message: Option<String>,
}

impl Wire for RegisterResponse {
    fn encode(&self, buf: &mut BytesMut) {
        put_bool(buf, self.success);
        put_opt_u64(buf, self.user_id);
        put_opt_string(buf, &self.message);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            success: get_bool(buf)?,
            user_id: get_opt_u64(buf)?,
            message: get_opt_string(buf)?,
        })
    }
}

/// CHANGE_PASSWORD. An absent `new_password_hash` removes the password,
/// which the server permits only when the user has at least one SSH key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangePassword {
    /// Current password pre-hash; absent for password-less accounts.
    pub old_password_hash: Option<[u8; 32]>,
    /// New password pre-hash; absent to remove the password.
    pub new_password_hash: Option<[u8; 32]>,
}

impl Wire for ChangePassword {
    fn encode(&self, buf: &mut BytesMut) {
        put_opt_key32(buf, &self.old_password_hash);
        put_opt_key32(buf, &self.new_password_hash);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            old_password_hash: get_opt_key32(buf)?,
            new_password_hash: get_opt_key32(buf)?,
        })
    }
}

/// PASSWORD_CHANGED.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordChanged {
    /// Whether the change was applied.
    pub success: bool,
    /// Failure detail.
    pub message: Option<String>,
}

impl Wire for PasswordChanged {
    fn encode(&self, buf: &mut BytesMut) {
        put_bool(buf, self.success);
        put_opt_string(buf, &self.message);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            success: get_bool(buf)?,
            message: get_opt_string(buf)?,
        })
    }
}

/// LOGOUT: drop authentication and return to the anonymous state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Logout;

impl Wire for Logout {
    fn encode(&self, _buf: &mut BytesMut) {}

    fn decode(_buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self)
    }
}

/// LOGOUT_RESPONSE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogoutResponse {
    /// Whether a user was actually logged out.
    pub success: bool,
}

impl Wire for LogoutResponse {
    fn encode(&self, buf: &mut BytesMut) {
        put_bool(buf, self.success);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            success: get_bool(buf)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::{round_trip, Message};
    use super::*;

    #[test]
    fn auth_round_trips() {
        round_trip(Message::AuthRequest(AuthRequest {
            nickname: "bob".into(),
            password_hash: [7u8; 32],
        }));
        round_trip(Message::AuthResponse(AuthResponse {
            success: true,
            user_id: Some(42),
            nickname: Some("bob".into()),
            is_admin: false,
            message: None,
        }));
        round_trip(Message::AuthResponse(AuthResponse {
            success: false,
            user_id: None,
            nickname: None,
            is_admin: false,
            message: Some("Invalid password".into()),
        }));
    }

    #[test]
    fn nickname_and_register_round_trips() {
        round_trip(Message::SetNickname(SetNickname { nickname: "a".into() }));
        round_trip(Message::NicknameResponse(NicknameResponse {
            success: false,
            message: Some("Nickname registered, password required".into()),
        }));
        round_trip(Message::RegisterUser(RegisterUser {
            nickname: "carol".into(),
            password_hash: [1u8; 32],
        }));
        round_trip(Message::RegisterResponse(RegisterResponse {
            success: true,
            user_id: Some(1),
            message: None,
        }));
    }

    #[test]
    fn password_change_round_trips() {
        round_trip(Message::ChangePassword(ChangePassword {
            old_password_hash: Some([2u8; 32]),
            new_password_hash: None,
        }));
        round_trip(Message::PasswordChanged(PasswordChanged {
            success: true,
            message: None,
        }));
        round_trip(Message::Logout(Logout));
        round_trip(Message::LogoutResponse(LogoutResponse { success: true }));
    }
}
