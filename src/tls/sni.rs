//! SNI extraction from a raw TLS `ClientHello`.
//!
//! The parser operates on whatever prefix of the handshake has arrived so
//! far. It is deliberately forgiving: truncated, corrupt, or adversarial
//! buffers yield `None`, never a panic, and the scan never reads past the
//! supplied slice. Callers re-run it as more bytes accumulate; once a
//! hostname has been found on some prefix, every longer prefix yields the
//! same hostname.

use base64::Engine;

use crate::tls::hostname;

/// TLS record content type for handshake messages.
const CONTENT_TYPE_HANDSHAKE: u8 = 0x16;

/// Handshake message type for ClientHello.
const HANDSHAKE_CLIENT_HELLO: u8 = 0x01;

/// Record header (5) + handshake header (4) + version (2) + random (32) +
/// session-id length (1) + minimum extension framing (9).
const MIN_CLIENT_HELLO: usize = 53;

/// Fixed offset of the session-id length byte: record header (5), handshake
/// type (1), handshake length (3), protocol version (2), random (32).
const SESSION_ID_LEN_OFFSET: usize = 43;

/// Smallest possible server_name extension: type (2) + length (2) +
/// list length (2) + name type (1) + name length (2).
const MIN_EXTENSION_FRAMING: usize = 9;

/// Extracts the SNI hostname from the start of a TLS handshake buffer.
///
/// Returns `None` when the buffer does not (yet) contain a ClientHello
/// carrying a syntactically valid hostname. The scan walks forward one byte
/// at a time past anything that merely resembles the server_name extension,
/// so a legitimate SNI is still found behind look-alike bytes.
pub fn extract_hostname(buf: &[u8]) -> Option<String> {
    if buf.len() < MIN_CLIENT_HELLO {
        return None;
    }
    if buf[0] != CONTENT_TYPE_HANDSHAKE || buf[5] != HANDSHAKE_CLIENT_HELLO {
        return None;
    }

    let mut offset = SESSION_ID_LEN_OFFSET;
    let session_id_len = buf[offset] as usize;
    offset += 1 + session_id_len;

    while offset + MIN_EXTENSION_FRAMING <= buf.len() {
        if buf[offset] == 0x00 && buf[offset + 1] == 0x00 {
            if let Some(name) = server_name_at(buf, offset) {
                return Some(name);
            }
        }
        offset += 1;
    }
    None
}

/// Validates a server_name extension candidate starting at `offset` (which
/// points at the two zero bytes of the extension type). Any mismatch returns
/// `None` and the caller advances the scan by one byte.
fn server_name_at(buf: &[u8], offset: usize) -> Option<String> {
    let extension_len = read_u16(buf, offset + 2);
    let list_len = read_u16(buf, offset + 4);
    if extension_len <= list_len || offset + 6 + list_len > buf.len() {
        return None;
    }
    // First list entry must be a host_name.
    if buf[offset + 6] != 0x00 {
        return None;
    }
    let name_len = read_u16(buf, offset + 7);
    if name_len >= extension_len {
        return None;
    }
    let name_start = offset + MIN_EXTENSION_FRAMING;
    let name_end = name_start.checked_add(name_len)?;
    if name_end > buf.len() {
        return None;
    }
    let name = std::str::from_utf8(&buf[name_start..name_end]).ok()?;
    if !hostname::is_hostname(name) {
        return None;
    }
    Some(name.to_string())
}

fn read_u16(buf: &[u8], offset: usize) -> usize {
    u16::from_be_bytes([buf[offset], buf[offset + 1]]) as usize
}

/// Records a buffer no hostname could be extracted from, base64-encoded so
/// odd client behavior can be reconstructed offline. Called once per
/// connection, when the prelude reader gives up.
pub fn log_unparsed(buf: &[u8]) {
    if buf.is_empty() {
        return;
    }
    tracing::debug!(
        len = buf.len(),
        prelude = %base64::engine::general_purpose::STANDARD.encode(buf),
        "no SNI hostname in handshake prelude"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::client_hello;

    #[test]
    fn extracts_hostname_from_client_hello() {
        let hello = client_hello("fooobar.com");
        assert_eq!(extract_hostname(&hello), Some("fooobar.com".to_string()));
    }

    #[test]
    fn single_label_hostname() {
        let hello = client_hello("localhost");
        assert_eq!(extract_hostname(&hello), Some("localhost".to_string()));
    }

    #[test]
    fn non_tls_buffers_yield_none() {
        assert_eq!(extract_hostname(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n"), None);
        assert_eq!(extract_hostname(&[]), None);
        assert_eq!(extract_hostname(&[0x16, 0x03, 0x01]), None);
    }

    #[test]
    fn wrong_content_type_yields_none() {
        let mut hello = client_hello("example.com");
        hello[0] = 0x17;
        assert_eq!(extract_hostname(&hello), None);
    }

    #[test]
    fn wrong_handshake_type_yields_none() {
        let mut hello = client_hello("example.com");
        hello[5] = 0x02;
        assert_eq!(extract_hostname(&hello), None);
    }

    #[test]
    fn hello_without_sni_yields_none() {
        let hello = crate::testutil::client_hello_without_sni();
        assert_eq!(extract_hostname(&hello), None);
    }

    #[test]
    fn truncated_prefixes_are_monotonic() {
        let hello = client_hello("fooobar.com");
        let full = extract_hostname(&hello).expect("full hello parses");

        // Find the first prefix length at which the parser succeeds; every
        // shorter prefix must yield None, every longer one the same name.
        let mut threshold = None;
        for len in 0..=hello.len() {
            match extract_hostname(&hello[..len]) {
                Some(name) => {
                    assert_eq!(name, full);
                    if threshold.is_none() {
                        threshold = Some(len);
                    }
                }
                None => {
                    assert!(threshold.is_none(), "parser lost the name at {len}");
                }
            }
        }
        assert!(threshold.is_some());
    }

    #[test]
    fn numeric_sni_is_not_a_hostname() {
        let hello = client_hello("192.168.0.1");
        assert_eq!(extract_hostname(&hello), None);
    }

    #[test]
    fn total_on_arbitrary_bytes() {
        // Pseudo-random buffers exercise the scanner's bounds checks; a
        // simple LCG keeps the test deterministic.
        let mut state = 0x2545f491_u64;
        for len in [0usize, 1, 52, 53, 54, 100, 512, 4096] {
            let mut buf = vec![0u8; len];
            for b in &mut buf {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                *b = (state >> 33) as u8;
            }
            // Must not panic, whatever it returns.
            let _ = extract_hostname(&buf);
            // Force the header checks to pass so the scan loop runs.
            if len > 5 {
                buf[0] = 0x16;
                buf[5] = 0x01;
                let _ = extract_hostname(&buf);
            }
        }
    }

    #[test]
    fn lookalike_bytes_before_real_extension() {
        // A session id of zero bytes keeps offsets predictable; the random
        // field is all zeros, which contains plenty of 0x0000 lookalikes the
        // scanner must step over without losing the real extension.
        let hello = client_hello("example.com");
        assert_eq!(extract_hostname(&hello), Some("example.com".to_string()));
    }
}
