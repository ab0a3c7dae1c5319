//! Shared helpers for unit tests.

use rustls::pki_types::{CertificateDer, PrivatePkcs8KeyDer};

use crate::tls::context::SecurityContext;

/// Builds a minimal TLS ClientHello carrying the given SNI hostname.
pub fn client_hello(hostname: &str) -> Vec<u8> {
    build_client_hello(Some(hostname))
}

/// Builds a minimal TLS ClientHello with no server_name extension.
pub fn client_hello_without_sni() -> Vec<u8> {
    build_client_hello(None)
}

fn build_client_hello(hostname: Option<&str>) -> Vec<u8> {
    let mut extensions = Vec::new();

    if let Some(host) = hostname {
        let host_bytes = host.as_bytes();
        // server_name: list length, name type, name length, name
        let mut sni_ext = Vec::new();
        sni_ext.extend_from_slice(&((host_bytes.len() + 3) as u16).to_be_bytes());
        sni_ext.push(0x00);
        sni_ext.extend_from_slice(&(host_bytes.len() as u16).to_be_bytes());
        sni_ext.extend_from_slice(host_bytes);

        extensions.extend_from_slice(&0u16.to_be_bytes());
        extensions.extend_from_slice(&(sni_ext.len() as u16).to_be_bytes());
        extensions.extend_from_slice(&sni_ext);
    }

    // supported_versions, so the hello is not bare of extensions
    extensions.extend_from_slice(&0x002bu16.to_be_bytes());
    extensions.extend_from_slice(&3u16.to_be_bytes());
    extensions.extend_from_slice(&[0x02, 0x03, 0x04]);

    let mut body = Vec::new();
    body.extend_from_slice(&[0x03, 0x03]); // TLS 1.2 legacy version
    body.extend_from_slice(&[0u8; 32]); // random
    body.push(0); // empty session id
    body.extend_from_slice(&2u16.to_be_bytes()); // cipher suites length
    body.extend_from_slice(&[0x13, 0x01]); // TLS_AES_128_GCM_SHA256
    body.push(1); // compression methods length
    body.push(0); // null compression
    body.extend_from_slice(&(extensions.len() as u16).to_be_bytes());
    body.extend_from_slice(&extensions);

    let mut handshake = Vec::new();
    handshake.push(0x01); // ClientHello
    handshake.extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]); // 3-byte length
    handshake.extend_from_slice(&body);

    let mut record = Vec::new();
    record.push(0x16); // handshake record
    record.extend_from_slice(&[0x03, 0x01]);
    record.extend_from_slice(&(handshake.len() as u16).to_be_bytes());
    record.extend_from_slice(&handshake);

    record
}

/// A self-signed security context for the given hostname.
pub fn self_signed_context(hostname: &str) -> SecurityContext {
    let cert = rcgen::generate_simple_self_signed(vec![hostname.to_string()])
        .expect("certificate generation");
    let cert_der = CertificateDer::from(cert.serialize_der().expect("serialize certificate"));
    let key_der = PrivatePkcs8KeyDer::from(cert.serialize_private_key_der());
    SecurityContext::from_single_cert(vec![cert_der], key_der.into())
        .expect("context from self-signed material")
}
