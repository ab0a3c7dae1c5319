//! SNI-routing TLS front-end library.
//!
//! One listening socket terminates TLS for any number of domains. For every
//! accepted connection the plaintext `ClientHello` is peeked just far enough
//! to parse the SNI hostname, a per-hostname security context is resolved,
//! and the buffered handshake bytes are replayed into the TLS engine so the
//! handshake proceeds as if nothing had been read. Secured connections come
//! out as ordinary byte streams.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌────────────────────────────────────────────────────┐
//!                    │                    SNI GATE                         │
//!                    │                                                     │
//!   TCP connection   │  ┌─────────┐   ┌─────────┐   ┌──────────────────┐  │
//!   ─────────────────┼─▶│ server  │──▶│ prelude │──▶│ tls::sni parser  │  │
//!                    │  │ accept  │   │ reader  │   │ + hostname check │  │
//!                    │  └─────────┘   └─────────┘   └────────┬─────────┘  │
//!                    │                                       │            │
//!                    │                                       ▼            │
//!                    │  ┌─────────┐   ┌─────────┐   ┌──────────────────┐  │
//!   TlsConnection    │  │ stream  │◀──│handshake│◀──│ context resolver │  │
//!   ◀────────────────┼──│ adapter │   │ (rustls)│   │ (per hostname)   │  │
//!                    │  └─────────┘   └─────────┘   └──────────────────┘  │
//!                    │                                                     │
//!                    │  ┌───────────────────────────────────────────────┐ │
//!                    │  │   config (schema / loader / validation)       │ │
//!                    │  └───────────────────────────────────────────────┘ │
//!                    └────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use snigate::{BindOptions, SecurityContext, SniServer};
//!
//! let options = BindOptions {
//!     default_context: Some(SecurityContext::from_pem_files(
//!         "certs/default.pem".as_ref(),
//!         "certs/default.key".as_ref(),
//!     )?),
//!     ..BindOptions::default()
//! };
//! let mut server = SniServer::bind("0.0.0.0:8443", options).await?;
//! while let Some(conn) = server.accept().await {
//!     let conn = conn?;
//!     tracing::info!(hostname = ?conn.sni_hostname(), "accepted");
//! }
//! ```

// Core subsystems
pub mod config;
pub mod net;
pub mod tls;

// Cross-cutting concerns
pub mod error;

#[cfg(test)]
mod testutil;

pub use error::{ServerError, ServerResult};
pub use net::connection::TlsConnection;
pub use net::prelude::{read_prelude, Prelude, MAX_PRELUDE_BYTES, PRELUDE_DEADLINE};
pub use net::server::{BindOptions, SniServer};
pub use net::stream::ByteStream;
pub use tls::context::{ContextResolver, SecurityContext};
pub use tls::handshake::{secure_server, PreludeStream, SecureIo};
