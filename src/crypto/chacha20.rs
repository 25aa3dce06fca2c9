//! ChaCha20 stream cipher, applied directly as a byte-stream transform.
//!
//! Unlike the teacher's ChaCha20-Poly1305 AEAD usage, this wraps the bare
//! `chacha20` crate's [`StreamCipher`] directly: no nonce-per-message, no
//! authentication tag, no message framing at all. `apply_keystream` already
//! advances the cipher's internal block counter across calls, so this type
//! only needs to hold the cipher instance — continuity across arbitrary
//! chunk boundaries is the crate's own guarantee, not something this module
//! has to implement.

use chacha20::cipher::{KeyIvInit, StreamCipher as _};
use chacha20::ChaCha20;

use super::Cipher;

/// Fixed nonce: safe here only because each instance is used for exactly one
/// keystream, derived from a key that is itself unique to this connection's
/// direction (see [`super::keys`]). Reusing a `ChaCha20Stream` across two
/// different key-derivation calls would break this.
const ZERO_NONCE: [u8; 12] = [0u8; 12];

pub struct ChaCha20Stream {
    cipher: ChaCha20,
}

impl ChaCha20Stream {
    pub fn new(key: &[u8; 32]) -> Self {
        let cipher = ChaCha20::new(key.into(), &ZERO_NONCE.into());
        Self { cipher }
    }
}

impl Cipher for ChaCha20Stream {
    fn apply(&mut self, data: &mut [u8]) {
        self.cipher.apply_keystream(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_recovers_plaintext() {
        let key = [7u8; 32];
        let mut enc = ChaCha20Stream::new(&key);
        let mut dec = ChaCha20Stream::new(&key);

        let original = b"the quick brown fox jumps over the lazy dog".to_vec();
        let mut buf = original.clone();
        enc.apply(&mut buf);
        assert_ne!(buf, original);
        dec.apply(&mut buf);
        assert_eq!(buf, original);
    }

    #[test]
    fn keystream_is_continuous_across_arbitrary_chunk_boundaries() {
        let key = [3u8; 32];
        let plaintext = (0..500u32).map(|i| (i % 251) as u8).collect::<Vec<u8>>();

        let mut whole = plaintext.clone();
        ChaCha20Stream::new(&key).apply(&mut whole);

        let mut chunked = plaintext.clone();
        let mut cipher = ChaCha20Stream::new(&key);
        for chunk in chunked.chunks_mut(7) {
            cipher.apply(chunk);
        }

        assert_eq!(whole, chunked, "ciphertext must not depend on chunk sizes");
    }
}
