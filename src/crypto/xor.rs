//! Stateful XOR stream cipher.
//!
//! ⚠️ Cryptographically weak — offered for dependency-free testing and for
//! environments that want no third-party cipher at all, not for production
//! confidentiality. Use [`super::chacha20::ChaCha20Stream`] for anything
//! that matters.
//!
//! This differs from a naive repeating-key XOR in one important way: the
//! key index is *not* reset to zero on every call. It is carried in `pos`
//! and advanced by however many bytes each `apply` call processes. Resetting
//! per call only produces a correct, symmetric transform if every call to
//! the encrypting side is matched byte-for-byte by a call of the same size
//! on the decrypting side — not guaranteed once the data is carried over
//! TCP, which delivers bytes in whatever chunks happen to arrive. Tracking
//! `pos` makes the keystream continuous regardless of chunk boundaries, the
//! same property `ChaCha20Stream` gets for free from its block counter.

use super::Cipher;

pub struct XorStream {
    key: [u8; 32],
    pos: usize,
}

impl XorStream {
    pub fn new(key: &[u8; 32]) -> Self {
        Self { key: *key, pos: 0 }
    }
}

impl Cipher for XorStream {
    fn apply(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            *byte ^= self.key[self.pos % self.key.len()];
            self.pos += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_recovers_plaintext() {
        let key = [0xab; 32];
        let mut enc = XorStream::new(&key);
        let mut dec = XorStream::new(&key);

        let original = b"shared password, split keystreams".to_vec();
        let mut buf = original.clone();
        enc.apply(&mut buf);
        assert_ne!(buf, original);
        dec.apply(&mut buf);
        assert_eq!(buf, original);
    }

    #[test]
    fn position_advances_across_calls_so_chunking_does_not_matter() {
        let key = [0x11; 32];
        let plaintext: Vec<u8> = (0..100u32).map(|i| i as u8).collect();

        let mut whole = plaintext.clone();
        XorStream::new(&key).apply(&mut whole);

        let mut chunked = plaintext.clone();
        let mut cipher = XorStream::new(&key);
        for chunk in chunked.chunks_mut(3) {
            cipher.apply(chunk);
        }

        assert_eq!(whole, chunked);
    }

    #[test]
    fn resetting_position_per_call_would_break_mismatched_chunking() {
        // demonstrates why `pos` must persist: re-deriving a fresh cipher
        // for every call (equivalent to the naive reset-per-call approach)
        // produces a different, misaligned result once chunk sizes diverge
        // between the writer and this isolated re-keying.
        let key: [u8; 32] = std::array::from_fn(|i| i as u8);
        let plaintext: Vec<u8> = (0..20u32).map(|i| i as u8).collect();

        let mut correct = plaintext.clone();
        XorStream::new(&key).apply(&mut correct);

        let mut naive = plaintext.clone();
        for chunk in naive.chunks_mut(5) {
            XorStream::new(&key).apply(chunk); // fresh pos=0 every call
        }

        assert_ne!(correct, naive, "naive per-call reset must misalign");
    }
}
