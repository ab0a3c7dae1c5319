//! Server error types.

use std::net::SocketAddr;

use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while binding, accepting, or securing connections.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind the listening socket.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to accept a connection from the listener.
    #[error("failed to accept connection: {0}")]
    Accept(#[source] std::io::Error),

    /// I/O error on an individual connection.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS protocol error reported by the engine.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Certificate or private key material could not be loaded.
    #[error("invalid key material: {0}")]
    KeyMaterial(String),
}

impl ServerError {
    /// Returns true if the error is scoped to a single connection rather
    /// than the server as a whole.
    pub fn is_connection_scoped(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Tls(_) | Self::Accept(_))
    }
}
