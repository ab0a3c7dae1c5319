//! Accepted secure connections.

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use rustls::pki_types::CertificateDer;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::net::stream::ByteStream;
use crate::tls::handshake::SecureIo;

/// Process-wide counter for connection ids. A u64 is plenty and keeps the
/// id cheap enough to stamp on every log line.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_connection_id() -> u64 {
    NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)
}

/// A connection whose TLS handshake has completed.
///
/// Implements [`AsyncRead`] and [`AsyncWrite`] directly; callers who want
/// chunked reads and queued writes instead can convert with
/// [`into_byte_stream`](Self::into_byte_stream).
pub struct TlsConnection {
    id: u64,
    peer_addr: SocketAddr,
    hostname: Option<String>,
    io: SecureIo,
}

impl TlsConnection {
    pub(crate) fn new(
        id: u64,
        peer_addr: SocketAddr,
        hostname: Option<String>,
        io: SecureIo,
    ) -> Self {
        Self {
            id,
            peer_addr,
            hostname,
            io,
        }
    }

    /// Server-assigned connection id, unique within the process.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Address of the remote peer.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// The SNI hostname this connection was routed on, if the client sent
    /// one that survived the configured validation policy.
    pub fn sni_hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    /// The ALPN protocol negotiated during the handshake.
    pub fn alpn_protocol(&self) -> Option<Vec<u8>> {
        self.io.get_ref().1.alpn_protocol().map(<[u8]>::to_vec)
    }

    /// The peer's leaf certificate, when client authentication ran.
    pub fn peer_certificate(&self) -> Option<CertificateDer<'static>> {
        self.io
            .get_ref()
            .1
            .peer_certificates()
            .and_then(|certs| certs.first())
            .cloned()
    }

    /// Wraps the connection in the chunked duplex adapter.
    pub fn into_byte_stream(self) -> ByteStream<SecureIo> {
        ByteStream::new(self.io)
    }

    /// The underlying TLS stream.
    pub fn into_inner(self) -> SecureIo {
        self.io
    }
}

impl std::fmt::Debug for TlsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConnection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("hostname", &self.hostname)
            .finish_non_exhaustive()
    }
}

impl AsyncRead for TlsConnection {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.io).poll_read(cx, buf)
    }
}

impl AsyncWrite for TlsConnection {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.io).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.io).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.io).poll_shutdown(cx)
    }
}
