//! Handshake prelude accumulation.
//!
//! Before a security context can be chosen, enough of the client's plaintext
//! `ClientHello` must be read to extract SNI. The reader below accumulates
//! bytes from a freshly accepted socket without blocking a thread, bounded
//! by a byte cap and an overall deadline so a stalled or hostile peer can
//! never pin a connection task.
//!
//! A `ClientHello` almost always arrives in the first segment, so the common
//! case is a single non-blocking read with no readiness registration at all.
//! The slow path alternates non-blocking reads with readiness waits, and
//! yields to the scheduler after a burst of consecutive successful reads so
//! one connection cannot monopolize the loop.

use std::time::Duration;

use bytes::BytesMut;
use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::tls::{hostname, sni};

/// Hard cap on accumulated prelude bytes.
pub const MAX_PRELUDE_BYTES: usize = 16 * 1024;

/// Total wall-clock budget for SNI extraction on one connection.
pub const PRELUDE_DEADLINE: Duration = Duration::from_secs(30);

/// Per-read size; a hello fitting in one segment is read in one call.
const READ_CHUNK: usize = 1024;

/// Cap on a single readiness wait, so the deadline is re-checked regularly.
const EVENT_WAIT: Duration = Duration::from_secs(5);

/// Consecutive successful reads before yielding to the scheduler.
const SPIN_BUDGET: u32 = 16;

/// The bytes consumed from the wire ahead of the TLS handshake, plus the
/// hostname parsed out of them, if any.
///
/// The buffer is append-only while the reader runs and is handed to the TLS
/// engine by move; nothing else observes it afterwards.
#[derive(Debug)]
pub struct Prelude {
    /// SNI hostname, already coerced by the public-domain policy.
    pub hostname: Option<String>,
    /// Raw bytes read from the socket, at most [`MAX_PRELUDE_BYTES`].
    pub bytes: BytesMut,
}

/// Reads from `stream` until an SNI hostname is parsed or a bound fires.
///
/// With `validate_public_domain` set, a parsed hostname failing the
/// public-domain predicate is treated as absent: the fast path returns
/// immediately with no hostname, the slow path keeps reading until a bound
/// fires, mirroring a client that never sent SNI at all.
///
/// Socket-level failures are returned to the caller; the accumulated bytes
/// are dropped with the connection in that case.
pub async fn read_prelude(
    stream: &TcpStream,
    validate_public_domain: bool,
) -> std::io::Result<Prelude> {
    let mut bytes = BytesMut::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];
    let deadline = Instant::now() + PRELUDE_DEADLINE;
    let mut spin = 0u32;
    let mut fast_path = true;

    loop {
        match stream.try_read(&mut chunk) {
            // Peer closed before a complete hello arrived.
            Ok(0) => break,
            Ok(n) => {
                bytes.extend_from_slice(&chunk[..n]);
                if let Some(name) = sni::extract_hostname(&bytes) {
                    let coerced = apply_domain_policy(name, validate_public_domain);
                    if coerced.is_some() || fast_path {
                        return Ok(Prelude {
                            hostname: coerced,
                            bytes,
                        });
                    }
                    // Coerced to absent mid-stream: keep reading, a bound
                    // will end the loop.
                }
                spin += 1;
                if spin >= SPIN_BUDGET {
                    spin = 0;
                    tokio::task::yield_now().await;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                spin = 0;
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                let wait = EVENT_WAIT.min(deadline - now);
                match tokio::time::timeout(wait, stream.readable()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => return Err(e),
                    // Per-wait timeout; the outer deadline decides below.
                    Err(_) => {}
                }
            }
            Err(e) => return Err(e),
        }

        fast_path = false;
        if bytes.len() >= MAX_PRELUDE_BYTES || Instant::now() >= deadline {
            break;
        }
    }

    sni::log_unparsed(&bytes);
    Ok(Prelude {
        hostname: None,
        bytes,
    })
}

/// Coerces a hostname that fails the public-domain predicate to absent.
fn apply_domain_policy(name: String, validate_public_domain: bool) -> Option<String> {
    if validate_public_domain && !hostname::is_public_domain(&name) {
        tracing::debug!(hostname = %name, "SNI rejected by public-domain policy");
        return None;
    }
    Some(name)
}
