//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → server.rs (accept loop, connection limits, shutdown)
//!     → prelude.rs (non-blocking SNI peek, bounded)
//!     → dispatcher.rs (context resolution, TLS handshake hand-off)
//!     → connection.rs (secured connection surfaced to the application)
//!     → stream.rs (optional chunked duplex adapter)
//! ```

pub mod connection;
pub(crate) mod dispatcher;
pub mod prelude;
pub mod server;
pub mod stream;

pub use connection::TlsConnection;
pub use prelude::{read_prelude, Prelude};
pub use server::{BindOptions, SniServer};
pub use stream::ByteStream;
