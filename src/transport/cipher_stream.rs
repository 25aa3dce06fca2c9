//! The inner, socket-facing stream wrapper: applies a [`Cipher`] to every
//! byte crossing the wire.
//!
//! Encryption is 1:1 on byte count (a stream cipher never changes how many
//! bytes exist, only their value), so reads apply the receive cipher
//! directly to whatever the inner stream just filled, in place. Writes are
//! buffered: a write is accepted (cipher applied once, immediately) and
//! queued, then drained into the inner stream across however many polls it
//! takes. This is what keeps the cipher's internal position advancing by
//! exactly one byte per plaintext byte consumed, never per byte attempted —
//! re-encrypting a write that was only partially accepted by the socket
//! would desynchronize the keystream between the two peers.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::crypto::Cipher;

pub struct EncryptedStream<T> {
    inner: T,
    send: Box<dyn Cipher>,
    recv: Box<dyn Cipher>,
    write_buf: Vec<u8>,
    write_pos: usize,
}

impl<T> EncryptedStream<T> {
    pub fn new(inner: T, send: Box<dyn Cipher>, recv: Box<dyn Cipher>) -> Self {
        Self {
            inner,
            send,
            recv,
            write_buf: Vec::new(),
            write_pos: 0,
        }
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for EncryptedStream<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                this.recv.apply(&mut buf.filled_mut()[before..]);
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for EncryptedStream<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        loop {
            if this.write_pos < this.write_buf.len() {
                match Pin::new(&mut this.inner).poll_write(cx, &this.write_buf[this.write_pos..]) {
                    Poll::Ready(Ok(n)) => {
                        this.write_pos += n;
                        continue;
                    }
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Pending => return Poll::Pending,
                }
            }
            this.write_buf.clear();
            this.write_pos = 0;
            if data.is_empty() {
                return Poll::Ready(Ok(0));
            }
            this.write_buf.extend_from_slice(data);
            this.send.apply(&mut this.write_buf);
            return Poll::Ready(Ok(data.len()));
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        while this.write_pos < this.write_buf.len() {
            match Pin::new(&mut this.inner).poll_write(cx, &this.write_buf[this.write_pos..]) {
                Poll::Ready(Ok(n)) => this.write_pos += n,
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => return Poll::Pending,
            }
        }
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::xor::XorStream;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn round_trips_through_a_duplex_pipe() {
        let (a, b) = duplex(64);
        let key = [0x5a; 32];
        let mut client = EncryptedStream::new(
            a,
            Box::new(XorStream::new(&key)),
            Box::new(XorStream::new(&key)),
        );
        let mut server = EncryptedStream::new(
            b,
            Box::new(XorStream::new(&key)),
            Box::new(XorStream::new(&key)),
        );

        client.write_all(b"hello over the wire").await.unwrap();
        client.flush().await.unwrap();

        let mut out = vec![0u8; 20];
        server.read_exact(&mut out).await.unwrap();
        assert_eq!(&out, b"hello over the wire");
    }
}
