//! Duplex byte-channel adapter.
//!
//! [`ByteStream`] presents a secured connection as a plain chunked byte
//! channel: inbound bytes arrive as [`Bytes`] chunks in wire order, outbound
//! writes go through a bounded FIFO queue with explicit flush semantics.
//!
//! Writes are eager: each call makes one immediate drain attempt and queues
//! whatever the transport would not take. Residual bytes drain
//! opportunistically whenever the stream is driven — during `read`, `flush`,
//! `close`, or a later `write` — so the queue empties as soon as the
//! transport becomes writable, and there is never more than one outstanding
//! writability wait per connection (all driving goes through `&mut self`).

use std::collections::VecDeque;
use std::future::poll_fn;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Per-read chunk size for the inbound side.
const READ_CHUNK: usize = 4096;

/// Cap on bytes held in the outbound queue before writes apply
/// backpressure by draining first.
const MAX_QUEUED_BYTES: usize = 256 * 1024;

/// Grace given to the outbound queue when the peer closes its read side.
const READ_CLOSED_DRAIN_GRACE: Duration = Duration::from_millis(2);

/// One queued outbound fragment. Partial writes advance `offset`.
struct WriteChunk {
    data: Bytes,
    offset: usize,
}

/// A chunked duplex byte channel over any async transport.
pub struct ByteStream<S> {
    io: S,
    write_queue: VecDeque<WriteChunk>,
    queued_bytes: usize,
    write_closed: bool,
    read_closed: bool,
}

enum ReadPoll {
    Data(Bytes),
    Eof,
    Failed(std::io::Error),
}

impl<S: AsyncRead + AsyncWrite + Unpin> ByteStream<S> {
    pub fn new(io: S) -> Self {
        Self {
            io,
            write_queue: VecDeque::new(),
            queued_bytes: 0,
            write_closed: false,
            read_closed: false,
        }
    }

    /// Reads the next inbound chunk, in wire order.
    ///
    /// Returns `None` once the peer has closed its write side or the stream
    /// has been closed locally; never emits after that. While waiting for
    /// inbound data, any queued outbound bytes are drained as the transport
    /// allows.
    pub async fn read(&mut self) -> Option<std::io::Result<Bytes>> {
        if self.read_closed {
            return None;
        }
        let mut buf = [0u8; READ_CHUNK];
        let outcome = poll_fn(|cx| {
            self.drive_queue(cx);
            let mut read_buf = ReadBuf::new(&mut buf);
            match Pin::new(&mut self.io).poll_read(cx, &mut read_buf) {
                Poll::Ready(Ok(())) => {
                    let filled = read_buf.filled();
                    if filled.is_empty() {
                        Poll::Ready(ReadPoll::Eof)
                    } else {
                        Poll::Ready(ReadPoll::Data(Bytes::copy_from_slice(filled)))
                    }
                }
                Poll::Ready(Err(e)) => Poll::Ready(ReadPoll::Failed(e)),
                Poll::Pending => Poll::Pending,
            }
        })
        .await;

        match outcome {
            ReadPoll::Data(chunk) => Some(Ok(chunk)),
            ReadPoll::Failed(e) => {
                self.read_closed = true;
                Some(Err(e))
            }
            ReadPoll::Eof => {
                self.read_closed = true;
                // Best-effort drain of pending output before reporting the
                // close; the peer may still be reading.
                if !self.write_queue.is_empty() {
                    let _ = tokio::time::timeout(
                        READ_CLOSED_DRAIN_GRACE,
                        poll_fn(|cx| self.poll_drain(cx)),
                    )
                    .await;
                }
                None
            }
        }
    }

    /// Queues `data` for transmission and makes one immediate drain attempt.
    ///
    /// Ignored after close. When the queue cap would be exceeded, the queue
    /// is drained first, so memory stays bounded under a slow peer.
    pub async fn write(&mut self, data: &[u8]) -> std::io::Result<()> {
        if self.write_closed || data.is_empty() {
            return Ok(());
        }
        if self.queued_bytes + data.len() > MAX_QUEUED_BYTES {
            poll_fn(|cx| self.poll_drain(cx)).await?;
        }
        self.write_queue.push_back(WriteChunk {
            data: Bytes::copy_from_slice(data),
            offset: 0,
        });
        self.queued_bytes += data.len();

        // One non-waiting attempt; residual bytes stay queued.
        poll_fn(|cx| match self.poll_drain(cx) {
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            _ => Poll::Ready(Ok(())),
        })
        .await
    }

    /// Writes a UTF-8 string.
    pub async fn write_str(&mut self, text: &str) -> std::io::Result<()> {
        self.write(text.as_bytes()).await
    }

    /// Writes a UTF-8 string followed by a newline.
    pub async fn write_line(&mut self, text: &str) -> std::io::Result<()> {
        let mut data = BytesMut::with_capacity(text.len() + 1);
        data.extend_from_slice(text.as_bytes());
        data.extend_from_slice(b"\n");
        self.write(&data).await
    }

    /// Resolves when the outbound queue is empty and the transport has been
    /// flushed. Returns immediately when nothing is queued.
    pub async fn flush(&mut self) -> std::io::Result<()> {
        poll_fn(|cx| self.poll_drain(cx)).await?;
        poll_fn(|cx| Pin::new(&mut self.io).poll_flush(cx)).await
    }

    /// Drains the queue, then shuts down the write side.
    ///
    /// Idempotent; later writes are silently dropped. The inbound side stops
    /// emitting once the peer observes the shutdown.
    pub async fn close(&mut self) -> std::io::Result<()> {
        if self.write_closed {
            return Ok(());
        }
        let drained = poll_fn(|cx| self.poll_drain(cx)).await;
        self.write_closed = true;
        self.discard_queue();
        drained?;
        poll_fn(|cx| Pin::new(&mut self.io).poll_shutdown(cx)).await
    }

    /// Tears the channel down in both directions after a best-effort drain.
    pub async fn destroy(&mut self) -> std::io::Result<()> {
        if !self.write_closed {
            let _ = tokio::time::timeout(
                READ_CLOSED_DRAIN_GRACE,
                poll_fn(|cx| self.poll_drain(cx)),
            )
            .await;
            self.write_closed = true;
            self.discard_queue();
        }
        self.read_closed = true;
        poll_fn(|cx| Pin::new(&mut self.io).poll_shutdown(cx)).await
    }

    /// Bytes currently held in the outbound queue.
    pub fn queued_bytes(&self) -> usize {
        self.queued_bytes
    }

    /// The wrapped transport.
    pub fn get_ref(&self) -> &S {
        &self.io
    }

    /// Consumes the adapter. Queued outbound bytes are discarded.
    pub fn into_inner(self) -> S {
        self.io
    }

    /// Drives the outbound queue as far as the transport allows right now.
    /// FIFO order; a partial write advances the front fragment's offset.
    fn poll_drain(&mut self, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        loop {
            let Some(front) = self.write_queue.front_mut() else {
                return Poll::Ready(Ok(()));
            };
            match Pin::new(&mut self.io).poll_write(cx, &front.data[front.offset..]) {
                Poll::Ready(Ok(0)) => {
                    return Poll::Ready(Err(std::io::Error::new(
                        std::io::ErrorKind::WriteZero,
                        "transport accepted zero bytes",
                    )));
                }
                Poll::Ready(Ok(n)) => {
                    front.offset += n;
                    self.queued_bytes -= n;
                    if front.offset == front.data.len() {
                        self.write_queue.pop_front();
                    }
                }
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => return Poll::Pending,
            }
        }
    }

    /// Opportunistic drain while waiting on the inbound side; failures close
    /// the write side rather than surfacing on the read path.
    fn drive_queue(&mut self, cx: &mut Context<'_>) {
        if self.write_closed || self.write_queue.is_empty() {
            return;
        }
        if let Poll::Ready(Err(e)) = self.poll_drain(cx) {
            tracing::warn!(error = %e, "outbound drain failed, dropping queued bytes");
            self.write_closed = true;
            self.discard_queue();
        }
    }

    fn discard_queue(&mut self) {
        self.write_queue.clear();
        self.queued_bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn writes_reach_peer_in_order() {
        let (near, mut far) = tokio::io::duplex(1024);
        let mut stream = ByteStream::new(near);

        for chunk in [&b"one"[..], b"two", b"three"] {
            stream.write(chunk).await.unwrap();
        }
        stream.flush().await.unwrap();
        assert_eq!(stream.queued_bytes(), 0);

        let mut out = vec![0u8; 11];
        far.read_exact(&mut out).await.unwrap();
        assert_eq!(&out, b"onetwothree");
    }

    #[tokio::test]
    async fn queue_survives_a_tiny_pipe() {
        // A 4-byte pipe forces partial writes; flush must still drain the
        // whole message front to back.
        let (near, mut far) = tokio::io::duplex(4);
        let mut stream = ByteStream::new(near);

        let payload: Vec<u8> = (0u8..64).collect();
        let reader = tokio::spawn(async move {
            let mut out = vec![0u8; 64];
            far.read_exact(&mut out).await.unwrap();
            out
        });

        stream.write(&payload).await.unwrap();
        stream.flush().await.unwrap();
        assert_eq!(reader.await.unwrap(), payload);
    }

    #[tokio::test]
    async fn flush_on_empty_queue_returns_immediately() {
        let (near, _far) = tokio::io::duplex(16);
        let mut stream = ByteStream::new(near);
        stream.flush().await.unwrap();
    }

    #[tokio::test]
    async fn reads_deliver_wire_order() {
        let (near, mut far) = tokio::io::duplex(1024);
        let mut stream = ByteStream::new(near);

        far.write_all(&[0, 1, 2, 3, 4]).await.unwrap();
        far.write_all(&[5, 6, 7, 8, 9]).await.unwrap();
        drop(far);

        let mut seen = Vec::new();
        while let Some(chunk) = stream.read().await {
            seen.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(seen, (0u8..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn no_emission_after_eof() {
        let (near, far) = tokio::io::duplex(16);
        let mut stream = ByteStream::new(near);
        drop(far);

        assert!(stream.read().await.is_none());
        assert!(stream.read().await.is_none());
    }

    #[tokio::test]
    async fn write_after_close_is_dropped() {
        let (near, mut far) = tokio::io::duplex(1024);
        let mut stream = ByteStream::new(near);

        stream.write(b"before").await.unwrap();
        stream.close().await.unwrap();
        stream.write(b"after").await.unwrap();
        assert_eq!(stream.queued_bytes(), 0);

        let mut out = Vec::new();
        far.read_to_end(&mut out).await.unwrap();
        assert_eq!(&out, b"before");
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (near, _far) = tokio::io::duplex(16);
        let mut stream = ByteStream::new(near);
        stream.close().await.unwrap();
        stream.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_drains_queue_first() {
        let (near, mut far) = tokio::io::duplex(4);
        let mut stream = ByteStream::new(near);

        let reader = tokio::spawn(async move {
            let mut out = Vec::new();
            far.read_to_end(&mut out).await.unwrap();
            out
        });

        let payload: Vec<u8> = (0u8..32).collect();
        stream.write(&payload).await.unwrap();
        stream.close().await.unwrap();
        assert_eq!(reader.await.unwrap(), payload);
    }

    #[tokio::test]
    async fn destroy_discards_residual_output() {
        let (near, _far) = tokio::io::duplex(4);
        let mut stream = ByteStream::new(near);

        // Far end never reads: the 2 ms grace expires with bytes queued.
        let payload = vec![7u8; 1024];
        stream.write(&payload).await.unwrap();
        stream.destroy().await.unwrap();
        assert_eq!(stream.queued_bytes(), 0);
        assert!(stream.read().await.is_none());
    }

    #[tokio::test]
    async fn write_line_appends_newline() {
        let (near, mut far) = tokio::io::duplex(64);
        let mut stream = ByteStream::new(near);
        stream.write_line("hello").await.unwrap();
        stream.flush().await.unwrap();

        let mut out = vec![0u8; 6];
        far.read_exact(&mut out).await.unwrap();
        assert_eq!(&out, b"hello\n");
    }
}
