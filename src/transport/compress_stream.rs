//! The outer, application-facing stream wrapper: compresses frame bytes on
//! the way out, decompresses them on the way in.
//!
//! Uses `flate2`'s low-level [`Compress`]/[`Decompress`] rather than its
//! `Read`/`Write` adaptor types, because every write must be independently
//! and immediately decodable on the other end — a frame written now must be
//! readable by the peer before the next frame is written, not buffered
//! inside zlib's internal window waiting for more input. `FlushCompress::Sync`
//! after every write gives exactly that: it flushes all pending output
//! without resetting the compression dictionary, so the stream stays well
//! compressed across many small writes instead of restarting cold each time.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

const CHUNK: usize = 8192;

pub struct CompressedStream<T> {
    inner: T,
    compressor: Compress,
    decompressor: Decompress,
    write_buf: Vec<u8>,
    write_pos: usize,
    read_raw: Vec<u8>,
    read_raw_pos: usize,
}

impl<T> CompressedStream<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            compressor: Compress::new(Compression::default(), false),
            decompressor: Decompress::new(false),
            write_buf: Vec::new(),
            write_pos: 0,
            read_raw: Vec::new(),
            read_raw_pos: 0,
        }
    }

    fn compress_all(&mut self, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut chunk = [0u8; CHUNK];
        let mut consumed = 0usize;
        while consumed < data.len() {
            let before_in = self.compressor.total_in();
            let before_out = self.compressor.total_out();
            self.compressor
                .compress(&data[consumed..], &mut chunk, FlushCompress::None)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            consumed += (self.compressor.total_in() - before_in) as usize;
            let produced = (self.compressor.total_out() - before_out) as usize;
            out.extend_from_slice(&chunk[..produced]);
        }
        // flush without resetting the dictionary so the peer can decode
        // everything written so far without waiting for more input.
        loop {
            let before_out = self.compressor.total_out();
            let status = self
                .compressor
                .compress(&[], &mut chunk, FlushCompress::Sync)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            let produced = (self.compressor.total_out() - before_out) as usize;
            out.extend_from_slice(&chunk[..produced]);
            if status == Status::BufError || produced == 0 {
                break;
            }
        }
        Ok(out)
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for CompressedStream<T> {
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
            let compressed = match this.compress_all(data) {
                Ok(c) => c,
                Err(e) => return Poll::Ready(Err(e)),
            };
            this.write_buf = compressed;
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

impl<T: AsyncRead + Unpin> AsyncRead for CompressedStream<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if this.read_raw_pos < this.read_raw.len() {
                let before_in = this.decompressor.total_in();
                let before_out = this.decompressor.total_out();
                let status = this
                    .decompressor
                    .decompress(
                        &this.read_raw[this.read_raw_pos..],
                        buf.initialize_unfilled(),
                        FlushDecompress::None,
                    )
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                let consumed = (this.decompressor.total_in() - before_in) as usize;
                let produced = (this.decompressor.total_out() - before_out) as usize;
                this.read_raw_pos += consumed;
                buf.advance(produced);
                if produced > 0 {
                    return Poll::Ready(Ok(()));
                }
                if status == Status::StreamEnd {
                    return Poll::Ready(Ok(()));
                }
                // no output yet; fall through to pull more raw bytes.
            }

            if this.read_raw_pos > 0 {
                this.read_raw.drain(0..this.read_raw_pos);
                this.read_raw_pos = 0;
            }

            let mut tmp = [0u8; CHUNK];
            let mut raw_buf = ReadBuf::new(&mut tmp);
            match Pin::new(&mut this.inner).poll_read(cx, &mut raw_buf) {
                Poll::Ready(Ok(())) => {
                    if raw_buf.filled().is_empty() {
                        return Poll::Ready(Ok(())); // EOF
                    }
                    this.read_raw.extend_from_slice(raw_buf.filled());
                }
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn round_trips_compressible_payload() {
        let (a, b) = duplex(4096);
        let mut writer = CompressedStream::new(a);
        let mut reader = CompressedStream::new(b);

        let payload = vec![b'x'; 2000];
        writer.write_all(&payload).await.unwrap();
        writer.flush().await.unwrap();

        let mut out = vec![0u8; payload.len()];
        reader.read_exact(&mut out).await.unwrap();
        assert_eq!(out, payload);
    }

    #[tokio::test]
    async fn each_write_is_independently_readable_before_the_next() {
        let (a, b) = duplex(4096);
        let mut writer = CompressedStream::new(a);
        let mut reader = CompressedStream::new(b);

        writer.write_all(b"first frame").await.unwrap();
        writer.flush().await.unwrap();
        let mut first = vec![0u8; 11];
        reader.read_exact(&mut first).await.unwrap();
        assert_eq!(&first, b"first frame");

        writer.write_all(b"second frame").await.unwrap();
        writer.flush().await.unwrap();
        let mut second = vec![0u8; 12];
        reader.read_exact(&mut second).await.unwrap();
        assert_eq!(&second, b"second frame");
    }
}
