//! Stream cipher module providing continuous-keystream encryption.
//!
//! Unlike whole-message AEAD, every cipher here transforms an unbounded byte
//! stream: two peers derive one keystream per direction from a shared
//! password and advance it byte-for-byte as data flows, regardless of how it
//! is chunked by the underlying TCP reads/writes. This is what lets
//! `transport::EncryptedStream` sit directly on a `TcpStream` and apply the
//! cipher to arbitrarily sized reads and writes without framing of its own.
//!
//! Two implementations are provided: [`chacha20::ChaCha20Stream`] (real
//! security, via RustCrypto's `chacha20` crate) and [`xor::XorStream`] (a
//! manually-kept-stateful XOR keystream, useful for tests and for
//! environments where a dependency-free cipher is preferred). [`plain`] is a
//! no-op passthrough for test doubles.

pub mod chacha20;
pub mod keys;
pub mod plain;
pub mod xor;

use crate::crypto::chacha20::ChaCha20Stream;
use crate::crypto::plain::PlainStream;
use crate::crypto::xor::XorStream;

/// A stateful, continuous stream cipher.
///
/// Implementations keep whatever internal position/counter state is needed
/// to apply the same keystream across however many calls a stream of bytes
/// is split into. Encryption and decryption of a stream cipher keystream are
/// the same operation (XOR against the keystream), so there is a single
/// `apply` method rather than separate `encrypt`/`decrypt`.
pub trait Cipher: Send {
    /// Applies the next `data.len()` bytes of keystream to `data` in place,
    /// advancing internal position state by that many bytes.
    fn apply(&mut self, data: &mut [u8]);
}

/// Selects which [`Cipher`] implementation a connection uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherKind {
    ChaCha20,
    Xor,
    Plain,
}

impl std::str::FromStr for CipherKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chacha20" => Ok(CipherKind::ChaCha20),
            "xor" => Ok(CipherKind::Xor),
            "plain" => Ok(CipherKind::Plain),
            other => Err(crate::Error::Config(format!("unknown cipher: {other}"))),
        }
    }
}

/// Builds the pair of ciphers (send, receive) for one end of a connection.
///
/// The two directions use independently derived keys (see [`keys`]) so
/// neither side ever reuses the other's keystream, even though both are
/// derived from the same shared password.
pub fn new_pair(kind: CipherKind, password: &str, we_are_client: bool) -> (Box<dyn Cipher>, Box<dyn Cipher>) {
    let (client_key, server_key) = keys::derive_directional_keys(password);
    let (send_key, recv_key) = if we_are_client {
        (client_key, server_key)
    } else {
        (server_key, client_key)
    };
    (new_cipher(kind, &send_key), new_cipher(kind, &recv_key))
}

fn new_cipher(kind: CipherKind, key: &[u8; 32]) -> Box<dyn Cipher> {
    match kind {
        CipherKind::ChaCha20 => Box::new(ChaCha20Stream::new(key)),
        CipherKind::Xor => Box::new(XorStream::new(key)),
        CipherKind::Plain => Box::new(PlainStream::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directional_keys_are_swapped_on_each_end() {
        let (client_send, client_recv) = new_pair(CipherKind::Xor, "hunter2", true);
        let (server_send, server_recv) = new_pair(CipherKind::Xor, "hunter2", false);

        let mut client_send = client_send;
        let mut server_recv = server_recv;
        let mut msg = b"hello".to_vec();
        let plain = msg.clone();
        client_send.apply(&mut msg);
        assert_ne!(msg, plain);
        server_recv.apply(&mut msg);
        assert_eq!(msg, plain, "server must decode what the client encoded");

        let mut server_send = server_send;
        let mut client_recv = client_recv;
        let mut reply = b"world".to_vec();
        let plain_reply = reply.clone();
        server_send.apply(&mut reply);
        client_recv.apply(&mut reply);
        assert_eq!(reply, plain_reply);
    }
}
