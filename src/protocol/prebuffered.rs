//! Prebuffered stream
//!
//! Bytes read while sniffing are not pushed back into the socket. Instead the
//! router freezes its peek buffer and hands the handler a stream that yields
//! those bytes first and then continues with the live connection.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Stream that replays already-read bytes ahead of the inner stream
#[derive(Debug)]
pub struct PrebufferedStream<S> {
    prebuffered: Bytes,
    inner: S,
}

impl<S> PrebufferedStream<S> {
    /// Create a stream that yields `prebuffered` before reading from `inner`
    pub fn new(prebuffered: Bytes, inner: S) -> Self {
        Self { prebuffered, inner }
    }

    /// Wrap a stream with nothing to replay
    pub fn passthrough(inner: S) -> Self {
        Self::new(Bytes::new(), inner)
    }

    /// Replay bytes not read yet
    pub fn prebuffered(&self) -> &[u8] {
        &self.prebuffered
    }

    /// Split into the unread replay bytes and the live stream
    pub fn into_parts(self) -> (Bytes, S) {
        (self.prebuffered, self.inner)
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for PrebufferedStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.prebuffered.has_remaining() {
            let n = self.prebuffered.len().min(buf.remaining());
            buf.put_slice(&self.prebuffered[..n]);
            self.prebuffered.advance(n);
            return Poll::Ready(Ok(()));
        }

        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for PrebufferedStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, data)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }
}
