//! Plain (no-op) cipher.
//!
//! Passes data through unchanged. Only useful for loopback tests that want
//! to exercise the transport without the noise of encrypted bytes.
//!
//! ⚠️ No security. Not a CLI-selectable default.

use super::Cipher;

pub struct PlainStream;

impl PlainStream {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PlainStream {
    fn default() -> Self {
        Self::new()
    }
}

impl Cipher for PlainStream {
    fn apply(&mut self, _data: &mut [u8]) {}
}
