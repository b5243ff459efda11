//! Server-side password storage.
//!
//! Clients never send raw passwords; they send a 32-byte argon2id pre-hash
//! (see `superchat_proto::auth`). The server wraps that in bcrypt (cost 10)
//! for storage and verifies with bcrypt's constant-time comparison. The
//! pre-hash is base64-encoded before bcrypt so the input is printable and
//! well under bcrypt's 72-byte limit.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

/// bcrypt work factor.
pub const BCRYPT_COST: u32 = 10;

fn encode(client_hash: &[u8; 32]) -> String {
    BASE64.encode(client_hash)
}

/// Hash a client pre-hash for storage.
pub fn store_hash(client_hash: &[u8; 32]) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(encode(client_hash), BCRYPT_COST)
}

/// Verify a client pre-hash against the stored bcrypt string.
/// Unparseable stored hashes verify as false.
pub fn verify(client_hash: &[u8; 32], stored: &str) -> bool {
    bcrypt::verify(encode(client_hash), stored).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let client_hash = [42u8; 32];
        let stored = store_hash(&client_hash).unwrap();
        assert!(verify(&client_hash, &stored));
    }

    #[test]
    fn wrong_hash_rejected() {
        let stored = store_hash(&[1u8; 32]).unwrap();
        assert!(!verify(&[2u8; 32], &stored));
    }

    #[test]
    fn garbage_stored_hash_rejected() {
        assert!(!verify(&[1u8; 32], "not-a-bcrypt-hash"));
    }
}
