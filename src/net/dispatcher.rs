//! Per-connection dispatch: prelude read, context resolution, handshake.
//!
//! Every accepted raw connection runs through [`dispatch`] on its own task.
//! Failures here are connection-scoped by construction: the task logs, the
//! socket drops, and the server keeps accepting.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::error::{ServerError, ServerResult};
use crate::net::connection::{next_connection_id, TlsConnection};
use crate::net::prelude::{read_prelude, Prelude};
use crate::tls::context::{resolve_context, ContextResolver, SecurityContext};
use crate::tls::handshake::secure_server;

/// State shared between the accept loop and all connection tasks.
pub(crate) struct DispatchContext {
    /// ALPN protocols forwarded verbatim to the TLS engine.
    pub supported_protocols: Option<Vec<Vec<u8>>>,
    /// Fallback context when the resolver declines or is absent.
    pub default_context: Option<SecurityContext>,
    /// Per-hostname context lookup.
    pub resolver: Option<ContextResolver>,
    /// Reject connections whose hello carried no usable SNI.
    pub require_sni: bool,
    /// Coerce SNI values that are not public-domain shaped to absent.
    pub validate_public_domain: bool,
    /// Set by `close`; suppresses publication of late handshakes.
    pub closed: AtomicBool,
    /// Output side of the server's connection stream.
    pub conn_tx: mpsc::Sender<ServerResult<TlsConnection>>,
}

/// Drives one raw connection from accept to publication.
pub(crate) async fn dispatch(
    shared: std::sync::Arc<DispatchContext>,
    stream: TcpStream,
    peer_addr: SocketAddr,
) {
    let conn_id = next_connection_id();

    let Prelude { hostname, bytes } =
        match read_prelude(&stream, shared.validate_public_domain).await {
            Ok(prelude) => prelude,
            Err(e) => {
                tracing::error!(
                    conn_id,
                    peer = %peer_addr,
                    error = %e,
                    "socket error while reading handshake prelude"
                );
                return;
            }
        };

    if shared.require_sni && hostname.is_none() {
        tracing::debug!(conn_id, peer = %peer_addr, "rejecting handshake without SNI");
        return;
    }

    let Some(context) = resolve_context(
        hostname.as_deref(),
        shared.resolver.as_ref(),
        shared.default_context.as_ref(),
    ) else {
        // resolve_context already logged the warning.
        return;
    };

    match secure_server(
        stream,
        &context,
        bytes,
        shared.supported_protocols.as_deref(),
    )
    .await
    {
        Ok(io) => {
            if shared.closed.load(Ordering::SeqCst) {
                tracing::debug!(conn_id, "dropping connection secured after server close");
                return;
            }
            tracing::debug!(
                conn_id,
                peer = %peer_addr,
                hostname = hostname.as_deref().unwrap_or("<none>"),
                "secure connection established"
            );
            let connection = TlsConnection::new(conn_id, peer_addr, hostname, io);
            // A send error means the receiver closed concurrently; the
            // connection drops with the task either way.
            let _ = shared.conn_tx.send(Ok(connection)).await;
        }
        Err(e) => {
            tracing::warn!(
                conn_id,
                peer = %peer_addr,
                hostname = hostname.as_deref().unwrap_or("<none>"),
                error = %e,
                "TLS handshake failed"
            );
        }
    }
}

/// Forwards an accept-loop failure to the server's output stream.
pub(crate) async fn publish_accept_error(
    shared: &DispatchContext,
    error: std::io::Error,
) -> bool {
    shared
        .conn_tx
        .send(Err(ServerError::Accept(error)))
        .await
        .is_ok()
}
