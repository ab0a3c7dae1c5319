//! Syntactic hostname validation.
//!
//! Two predicates: [`is_hostname`] accepts any well-formed DNS name,
//! including single labels like `localhost`; [`is_public_domain`] further
//! requires a letters-only top-level domain of at least two characters, the
//! shape a name must have to resolve on the public internet.
//!
//! Both reject purely numeric input (an IPv4 literal is not a hostname) and
//! anything longer than 253 characters. Internationalized names are accepted
//! in their A-label (`xn--`) form only; the label grammar covers them.

/// Maximum total length of a DNS name, per RFC 1035.
const MAX_NAME_LEN: usize = 253;

/// Maximum length of a single label.
const MAX_LABEL_LEN: usize = 63;

/// Checks that `name` is a well-formed hostname.
///
/// A hostname is one or more dot-separated labels. Each label starts and
/// ends with an ASCII letter or digit and may contain hyphens in between.
/// At least one letter must appear somewhere in the name, so IPv4 literals
/// such as `192.168.0.1` are rejected.
pub fn is_hostname(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return false;
    }
    let mut has_letter = false;
    for label in name.split('.') {
        if !is_label(label) {
            return false;
        }
        has_letter |= label.bytes().any(|b| b.is_ascii_alphabetic());
    }
    has_letter
}

/// Checks that `name` is a hostname in public-domain form: at least two
/// labels, the last of which is a letters-only TLD of 2 to 63 characters.
///
/// Everything rejected by [`is_hostname`] is rejected here as well.
pub fn is_public_domain(name: &str) -> bool {
    if !is_hostname(name) {
        return false;
    }
    let Some((_, tld)) = name.rsplit_once('.') else {
        return false;
    };
    tld.len() >= 2 && tld.len() <= MAX_LABEL_LEN && tld.bytes().all(|b| b.is_ascii_alphabetic())
}

/// A single label: `[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?`.
fn is_label(label: &str) -> bool {
    let bytes = label.as_bytes();
    let (Some(first), Some(last)) = (bytes.first(), bytes.last()) else {
        return false;
    };
    if bytes.len() > MAX_LABEL_LEN {
        return false;
    }
    if !first.is_ascii_alphanumeric() || !last.is_ascii_alphanumeric() {
        return false;
    }
    bytes
        .iter()
        .all(|b| b.is_ascii_alphanumeric() || *b == b'-')
}
