//! Client-side X25519 helpers for DM key agreement.
//!
//! The server only relays 32-byte public keys; everything here runs on
//! clients (and in tests standing in for clients).

use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};

/// A client DM keypair.
pub struct DmKeypair {
    secret: StaticSecret,
    /// Public key bytes as carried in PROVIDE_PUBLIC_KEY.
    pub public: [u8; 32],
}

/// Generate a fresh keypair from the OS RNG.
pub fn generate_keypair() -> DmKeypair {
    let secret = StaticSecret::random_from_rng(OsRng);
    let public = PublicKey::from(&secret).to_bytes();
    DmKeypair { secret, public }
}

impl DmKeypair {
    /// Diffie-Hellman against the peer key received in DM_READY.
    pub fn shared_secret(&self, peer_public: &[u8; 32]) -> [u8; 32] {
        let peer = PublicKey::from(*peer_public);
        self.secret.diffie_hellman(&peer).to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_sides_agree() {
        let a = generate_keypair();
        let b = generate_keypair();
        assert_eq!(a.shared_secret(&b.public), b.shared_secret(&a.public));
    }

    #[test]
    fn distinct_keypairs() {
        let a = generate_keypair();
        let b = generate_keypair();
        assert_ne!(a.public, b.public);
    }
}
