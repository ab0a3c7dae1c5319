//! Security contexts and per-hostname resolution.
//!
//! A [`SecurityContext`] bundles the certificate chain, private key, and
//! optional client-certificate trust anchors used to terminate one TLS
//! session. The server picks a context per connection: a caller-supplied
//! resolver is consulted first, then the default context.

use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};

use crate::error::{ServerError, ServerResult};

/// Per-hostname security context lookup.
///
/// Consulted at most once per accepted connection, and only when the client
/// sent a hostname. Returning `None` falls through to the default context.
pub type ContextResolver = Arc<dyn Fn(&str) -> Option<SecurityContext> + Send + Sync>;

/// Server-side cryptographic material for one domain.
///
/// Cheap to clone; the underlying rustls configuration is shared.
#[derive(Clone)]
pub struct SecurityContext {
    config: Arc<ServerConfig>,
}

impl SecurityContext {
    /// Builds a context from an already-assembled certificate chain and key.
    pub fn from_single_cert(
        cert_chain: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
    ) -> ServerResult<Self> {
        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(cert_chain, key)?;
        Ok(Self {
            config: Arc::new(config),
        })
    }

    /// Loads a context from PEM files on disk.
    pub fn from_pem_files(cert_path: &Path, key_path: &Path) -> ServerResult<Self> {
        let cert_chain = load_certs(cert_path)?;
        let key = load_private_key(key_path)?;
        Self::from_single_cert(cert_chain, key)
    }

    /// Builds a context that additionally requires client certificates
    /// chaining to the given trust anchors.
    pub fn with_client_auth(
        cert_chain: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
        client_roots: Vec<CertificateDer<'static>>,
    ) -> ServerResult<Self> {
        let mut roots = RootCertStore::empty();
        for root in client_roots {
            roots
                .add(root)
                .map_err(|e| ServerError::KeyMaterial(format!("bad client trust anchor: {e}")))?;
        }
        let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
            .build()
            .map_err(|e| ServerError::KeyMaterial(format!("client verifier: {e}")))?;
        let config = ServerConfig::builder()
            .with_client_cert_verifier(verifier)
            .with_single_cert(cert_chain, key)?;
        Ok(Self {
            config: Arc::new(config),
        })
    }

    /// Wraps a caller-built rustls configuration unchanged.
    pub fn from_server_config(config: Arc<ServerConfig>) -> Self {
        Self { config }
    }

    /// Returns this context with the given ALPN protocol list applied.
    ///
    /// The inner configuration is cloned only when the list differs from
    /// what the context already advertises.
    pub(crate) fn with_alpn(&self, protocols: &[Vec<u8>]) -> Self {
        if self.config.alpn_protocols == protocols {
            return self.clone();
        }
        let mut config = (*self.config).clone();
        config.alpn_protocols = protocols.to_vec();
        Self {
            config: Arc::new(config),
        }
    }

    pub(crate) fn server_config(&self) -> Arc<ServerConfig> {
        self.config.clone()
    }
}

impl std::fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityContext").finish_non_exhaustive()
    }
}

/// Picks the security context for a connection.
///
/// The resolver wins when a hostname is present and it returns a context;
/// otherwise the default applies. A connection without SNI never reaches the
/// resolver. `None` means the connection cannot be served and must be closed.
pub(crate) fn resolve_context(
    hostname: Option<&str>,
    resolver: Option<&ContextResolver>,
    default_context: Option<&SecurityContext>,
) -> Option<SecurityContext> {
    if let (Some(resolver), Some(name)) = (resolver, hostname) {
        if let Some(context) = resolver(name) {
            return Some(context);
        }
    }
    if let Some(default) = default_context {
        return Some(default.clone());
    }
    tracing::warn!(
        hostname = hostname.unwrap_or("<none>"),
        "no security context available"
    );
    None
}

/// Loads all certificates from a PEM file.
fn load_certs(path: &Path) -> ServerResult<Vec<CertificateDer<'static>>> {
    let file = std::fs::File::open(path).map_err(|e| {
        ServerError::KeyMaterial(format!("failed to read certificate file {}: {e}", path.display()))
    })?;
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<_, _>>()
        .map_err(|e| {
            ServerError::KeyMaterial(format!("failed to parse {}: {e}", path.display()))
        })?;
    if certs.is_empty() {
        return Err(ServerError::KeyMaterial(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

/// Loads the first private key (PKCS#8, PKCS#1, or SEC1) from a PEM file.
fn load_private_key(path: &Path) -> ServerResult<PrivateKeyDer<'static>> {
    let file = std::fs::File::open(path).map_err(|e| {
        ServerError::KeyMaterial(format!("failed to read key file {}: {e}", path.display()))
    })?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| ServerError::KeyMaterial(format!("failed to parse {}: {e}", path.display())))?
        .ok_or_else(|| {
            ServerError::KeyMaterial(format!("no private key found in {}", path.display()))
        })
}
