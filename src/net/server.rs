//! The SNI-routing TLS server.
//!
//! # Responsibilities
//! - Bind the listening socket with the configured socket options
//! - Run the accept loop, limiting concurrent pre-handshake work
//! - Surface secured connections as an ordered output stream
//! - Coordinate idempotent shutdown
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → accept loop (connection limit, shutdown watch)
//!     → dispatcher task (prelude read → context resolution → handshake)
//!     → output channel of TlsConnection
//!     → application consumer via accept()
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::JoinHandle;

use crate::error::{ServerError, ServerResult};
use crate::net::connection::TlsConnection;
use crate::net::dispatcher::{dispatch, publish_accept_error, DispatchContext};
use crate::net::stream::ByteStream;
use crate::tls::context::{ContextResolver, SecurityContext};
use crate::tls::handshake::SecureIo;

/// Buffered secured connections awaiting the application consumer.
const CONNECTION_CHANNEL_CAPACITY: usize = 128;

/// Options recognized by [`SniServer::bind`].
#[derive(Clone, Default)]
pub struct BindOptions {
    /// ALPN protocol list forwarded verbatim to the TLS engine.
    pub supported_protocols: Option<Vec<String>>,

    /// Used when the resolver returns nothing or is absent.
    pub default_context: Option<SecurityContext>,

    /// Per-hostname security context lookup.
    pub resolver: Option<ContextResolver>,

    /// Reject connections whose `ClientHello` omitted SNI.
    pub require_sni: bool,

    /// Treat SNI values failing the public-domain predicate as absent.
    pub validate_public_domain: bool,

    /// Listen backlog. Zero means the default of 1024.
    pub backlog: u32,

    /// Restrict an IPv6 listener to IPv6 traffic only.
    pub v6_only: bool,

    /// Set `SO_REUSEADDR` before binding.
    pub reuse_address: bool,

    /// Maximum connections in the pre-handshake pipeline. Zero means the
    /// default of 10,000.
    pub max_connections: usize,
}

impl BindOptions {
    fn effective_backlog(&self) -> i32 {
        if self.backlog == 0 {
            1024
        } else {
            self.backlog as i32
        }
    }

    fn effective_max_connections(&self) -> usize {
        if self.max_connections == 0 {
            10_000
        } else {
            self.max_connections
        }
    }
}

/// A TLS front-end terminating connections for multiple domains on one
/// listening socket.
///
/// Created by [`bind`](Self::bind); destroyed by [`close`](Self::close),
/// which is idempotent. Secured connections are consumed through
/// [`accept`](Self::accept) in handshake-completion order.
pub struct SniServer {
    local_addr: SocketAddr,
    conn_rx: mpsc::Receiver<ServerResult<TlsConnection>>,
    shared: Arc<DispatchContext>,
    shutdown_tx: broadcast::Sender<()>,
    accept_task: JoinHandle<()>,
    closed: bool,
}

impl SniServer {
    /// Binds the listening socket and starts accepting.
    pub async fn bind(addr: impl ToSocketAddrs, options: BindOptions) -> ServerResult<Self> {
        let addr = tokio::net::lookup_host(addr)
            .await?
            .next()
            .ok_or_else(|| {
                ServerError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "bind address did not resolve",
                ))
            })?;
        let listener = bind_listener(addr, &options)?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr,
            source,
        })?;
        let max_connections = options.effective_max_connections();

        let supported_protocols = options
            .supported_protocols
            .map(|list| list.into_iter().map(String::into_bytes).collect());

        let (conn_tx, conn_rx) = mpsc::channel(CONNECTION_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let shared = Arc::new(DispatchContext {
            supported_protocols,
            default_context: options.default_context,
            resolver: options.resolver,
            require_sni: options.require_sni,
            validate_public_domain: options.validate_public_domain,
            closed: AtomicBool::new(false),
            conn_tx,
        });

        tracing::info!(
            address = %local_addr,
            require_sni = shared.require_sni,
            validate_public_domain = shared.validate_public_domain,
            "TLS front-end listening"
        );

        let accept_task = tokio::spawn(accept_loop(
            listener,
            shared.clone(),
            shutdown_rx,
            max_connections,
        ));

        Ok(Self {
            local_addr,
            conn_rx,
            shared,
            shutdown_tx,
            accept_task,
            closed: false,
        })
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Waits for the next secured connection.
    ///
    /// `Err` items report accept-loop failures; the server stays open after
    /// them. `None` means the server has been closed.
    pub async fn accept(&mut self) -> Option<ServerResult<TlsConnection>> {
        self.conn_rx.recv().await
    }

    /// Like [`accept`](Self::accept), with the connection already wrapped in
    /// the chunked duplex adapter.
    pub async fn accept_byte_stream(&mut self) -> Option<ServerResult<ByteStream<SecureIo>>> {
        self.accept()
            .await
            .map(|result| result.map(TlsConnection::into_byte_stream))
    }

    /// Stops accepting, closes the listener, and closes the output stream.
    ///
    /// Idempotent. Handshakes already in flight run to completion but their
    /// connections are discarded rather than published.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.shared.closed.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());

        // No new items can enter the channel past this point; anything
        // already buffered is dropped unseen.
        self.conn_rx.close();
        while self.conn_rx.try_recv().is_ok() {}

        if let Err(e) = (&mut self.accept_task).await {
            if !e.is_cancelled() {
                tracing::warn!(error = %e, "accept loop ended abnormally");
            }
        }
        tracing::info!(address = %self.local_addr, "TLS front-end closed");
    }
}

impl Drop for SniServer {
    fn drop(&mut self) {
        // A dropped server must not leave the accept loop running.
        if !self.closed {
            self.shared.closed.store(true, Ordering::SeqCst);
            self.accept_task.abort();
        }
    }
}

/// Builds the listening socket with the platform options `bind` exposes.
fn bind_listener(addr: SocketAddr, options: &BindOptions) -> ServerResult<TcpListener> {
    let bind_err = |source: std::io::Error| ServerError::Bind { addr, source };

    let domain = if addr.is_ipv6() {
        Domain::IPV6
    } else {
        Domain::IPV4
    };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP)).map_err(bind_err)?;
    if addr.is_ipv6() {
        socket.set_only_v6(options.v6_only).map_err(bind_err)?;
    }
    if options.reuse_address {
        socket.set_reuse_address(true).map_err(bind_err)?;
    }
    socket.set_nonblocking(true).map_err(bind_err)?;
    socket.bind(&addr.into()).map_err(bind_err)?;
    socket.listen(options.effective_backlog()).map_err(bind_err)?;

    TcpListener::from_std(socket.into()).map_err(bind_err)
}

/// Accepts raw connections until shutdown, spawning one dispatcher task per
/// connection. A semaphore bounds how many connections may sit in the
/// pre-handshake pipeline at once.
async fn accept_loop(
    listener: TcpListener,
    shared: Arc<DispatchContext>,
    mut shutdown_rx: broadcast::Receiver<()>,
    max_connections: usize,
) {
    let limiter = Arc::new(Semaphore::new(max_connections));

    loop {
        // Shutdown must win even when the pipeline is saturated and no
        // permit is available.
        let permit = tokio::select! {
            _ = shutdown_rx.recv() => break,
            permit = limiter.clone().acquire_owned() => {
                permit.expect("connection limiter is never closed")
            }
        };

        let accepted = tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer_addr)) => {
                tracing::debug!(
                    peer = %peer_addr,
                    available_slots = limiter.available_permits(),
                    "connection accepted"
                );
                let shared = shared.clone();
                tokio::spawn(async move {
                    dispatch(shared, stream, peer_addr).await;
                    drop(permit);
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                if !publish_accept_error(&shared, e).await {
                    // Output stream gone: the server is closing.
                    break;
                }
            }
        }
    }
    // The listener drops here, releasing the socket.
}
