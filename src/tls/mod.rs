//! TLS subsystem: SNI parsing, hostname validation, security contexts, and
//! the handshake entry point.

pub mod context;
pub mod handshake;
pub mod hostname;
pub mod sni;

pub use context::{ContextResolver, SecurityContext};
pub use handshake::{secure_server, PreludeStream, SecureIo};
