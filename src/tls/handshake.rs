//! TLS handshake entry point.
//!
//! The prelude reader consumes handshake bytes off the wire before any
//! security context is known. [`secure_server`] replays those bytes ahead of
//! the socket through a [`PreludeStream`], so the rustls engine sees an
//! untouched byte sequence and the handshake proceeds as if the peek had
//! never happened.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;

use crate::error::ServerResult;
use crate::tls::context::SecurityContext;

/// The secured I/O type produced by [`secure_server`].
pub type SecureIo = TlsStream<PreludeStream<TcpStream>>;

/// Begins a server-side TLS handshake on `raw`, treating `buffered` as bytes
/// already consumed from the wire.
///
/// When `protocols` is non-empty it is advertised for ALPN; the context is
/// cloned with the list applied only when it differs.
pub async fn secure_server(
    raw: TcpStream,
    context: &SecurityContext,
    buffered: BytesMut,
    protocols: Option<&[Vec<u8>]>,
) -> ServerResult<SecureIo> {
    let context = match protocols {
        Some(list) if !list.is_empty() => context.with_alpn(list),
        _ => context.clone(),
    };
    let acceptor = TlsAcceptor::from(context.server_config());
    let stream = acceptor
        .accept(PreludeStream::new(buffered, raw))
        .await?;
    Ok(stream)
}

/// A transport whose read side replays a buffered prelude before handing
/// control to the underlying socket. Writes pass straight through.
pub struct PreludeStream<S> {
    prelude: BytesMut,
    inner: S,
}

impl<S> PreludeStream<S> {
    pub fn new(prelude: BytesMut, inner: S) -> Self {
        Self { prelude, inner }
    }

    /// The wrapped transport.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for PreludeStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        if !self.prelude.is_empty() {
            let n = self.prelude.len().min(buf.remaining());
            let replay = self.prelude.split_to(n);
            buf.put_slice(&replay);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for PreludeStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
