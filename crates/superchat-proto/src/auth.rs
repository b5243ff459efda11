//! Client-side credential pre-hashing.
//!
//! Passwords never travel in the clear: the client sends
//! `argon2id(password, salt = nickname, t = 3, m = 64 MiB, p = 4, out = 32)`
//! and the server stores a bcrypt wrap of that output. Nicknames shorter
//! than eight bytes are zero-padded to satisfy the argon2 minimum salt
//! length; the padding is part of the protocol, not an implementation
//! detail.

use argon2::{Algorithm, Argon2, Params, Version};

/// argon2id time cost.
pub const ARGON2_T_COST: u32 = 3;

/// argon2id memory cost in KiB (64 MiB).
pub const ARGON2_M_COST_KIB: u32 = 64 * 1024;

/// argon2id parallelism.
pub const ARGON2_P_COST: u32 = 4;

/// Output length in bytes.
pub const HASH_LEN: usize = 32;

const MIN_SALT_LEN: usize = 8;

/// Errors from [`client_password_hash`].
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    /// The argon2 computation rejected its inputs.
    #[error("argon2 failure: {0}")]
    Argon2(String),
}

/// Compute the 32-byte pre-hash the client sends in AUTH_REQUEST and
/// REGISTER_USER.
pub fn client_password_hash(nickname: &str, password: &str) -> Result<[u8; 32], HashError> {
    let mut salt = nickname.as_bytes().to_vec();
    if salt.len() < MIN_SALT_LEN {
        salt.resize(MIN_SALT_LEN, 0);
    }

    let params = Params::new(ARGON2_M_COST_KIB, ARGON2_T_COST, ARGON2_P_COST, Some(HASH_LEN))
        .map_err(|e| HashError::Argon2(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut out = [0u8; HASH_LEN];
    argon2
        .hash_password_into(password.as_bytes(), &salt, &mut out)
        .map_err(|e| HashError::Argon2(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_per_nickname() {
        let a = client_password_hash("alice", "hunter2").unwrap();
        let b = client_password_hash("alice", "hunter2").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn salt_binds_nickname() {
        let a = client_password_hash("alice", "hunter2").unwrap();
        let b = client_password_hash("aliceb", "hunter2").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn short_nicknames_are_padded() {
        // Must not error on nicknames below the argon2 salt minimum.
        let a = client_password_hash("al", "pw").unwrap();
        let b = client_password_hash("al", "pw2").unwrap();
        assert_ne!(a, b);
    }
}
