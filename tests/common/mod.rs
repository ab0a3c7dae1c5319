//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::Arc;

use rustls::client::ClientConfig;
use rustls::pki_types::{CertificateDer, PrivatePkcs8KeyDer, ServerName};
use rustls::RootCertStore;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use snigate::SecurityContext;

static TRACING: std::sync::Once = std::sync::Once::new();

/// Installs a fmt subscriber honoring `RUST_LOG`, once per test binary.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

/// A self-signed certificate bundle: the server-side context plus the DER
/// certificate a test client needs to trust.
pub struct TestCert {
    pub context: SecurityContext,
    pub cert: CertificateDer<'static>,
}

/// Generates a self-signed certificate for `hostname`.
pub fn self_signed(hostname: &str) -> TestCert {
    let cert = rcgen::generate_simple_self_signed(vec![hostname.to_string()])
        .expect("certificate generation");
    let cert_der = CertificateDer::from(cert.serialize_der().expect("serialize certificate"));
    let key_der = PrivatePkcs8KeyDer::from(cert.serialize_private_key_der());
    let context = SecurityContext::from_single_cert(vec![cert_der.clone()], key_der.into())
        .expect("context from self-signed material");
    TestCert {
        context,
        cert: cert_der,
    }
}

/// Connects a TLS client that trusts `trust`, presenting `server_name` via
/// SNI and offering `alpn` protocols.
pub async fn tls_client(
    addr: SocketAddr,
    server_name: &str,
    trust: &CertificateDer<'static>,
    alpn: &[&str],
) -> std::io::Result<tokio_rustls::client::TlsStream<TcpStream>> {
    let mut roots = RootCertStore::empty();
    roots.add(trust.clone()).expect("trust anchor");
    let mut config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    config.alpn_protocols = alpn.iter().map(|p| p.as_bytes().to_vec()).collect();

    let connector = TlsConnector::from(Arc::new(config));
    let stream = TcpStream::connect(addr).await?;
    let name = ServerName::try_from(server_name.to_string()).expect("server name");
    connector.connect(name, stream).await
}

/// Builds a minimal TLS ClientHello carrying the given SNI hostname, for
/// driving the server below the rustls client layer.
#[allow(dead_code)]
pub fn client_hello(hostname: &str) -> Vec<u8> {
    build_client_hello(Some(hostname))
}

/// Builds a minimal TLS ClientHello with no server_name extension.
#[allow(dead_code)]
pub fn client_hello_without_sni() -> Vec<u8> {
    build_client_hello(None)
}

fn build_client_hello(hostname: Option<&str>) -> Vec<u8> {
    let mut extensions = Vec::new();

    if let Some(host) = hostname {
        let host_bytes = host.as_bytes();
        let mut sni_ext = Vec::new();
        sni_ext.extend_from_slice(&((host_bytes.len() + 3) as u16).to_be_bytes());
        sni_ext.push(0x00);
        sni_ext.extend_from_slice(&(host_bytes.len() as u16).to_be_bytes());
        sni_ext.extend_from_slice(host_bytes);

        extensions.extend_from_slice(&0u16.to_be_bytes());
        extensions.extend_from_slice(&(sni_ext.len() as u16).to_be_bytes());
        extensions.extend_from_slice(&sni_ext);
    }

    extensions.extend_from_slice(&0x002bu16.to_be_bytes());
    extensions.extend_from_slice(&3u16.to_be_bytes());
    extensions.extend_from_slice(&[0x02, 0x03, 0x04]);

    let mut body = Vec::new();
    body.extend_from_slice(&[0x03, 0x03]);
    body.extend_from_slice(&[0u8; 32]);
    body.push(0);
    body.extend_from_slice(&2u16.to_be_bytes());
    body.extend_from_slice(&[0x13, 0x01]);
    body.push(1);
    body.push(0);
    body.extend_from_slice(&(extensions.len() as u16).to_be_bytes());
    body.extend_from_slice(&extensions);

    let mut handshake = Vec::new();
    handshake.push(0x01);
    handshake.extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]);
    handshake.extend_from_slice(&body);

    let mut record = Vec::new();
    record.push(0x16);
    record.extend_from_slice(&[0x03, 0x01]);
    record.extend_from_slice(&(handshake.len() as u16).to_be_bytes());
    record.extend_from_slice(&handshake);

    record
}
