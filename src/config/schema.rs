//! Configuration schema definitions.
//!
//! This module defines the file-driven configuration for the front-end.
//! All types derive Serde traits for deserialization from config files; the
//! programmatic surface remains [`BindOptions`](crate::net::BindOptions),
//! which [`GateConfig::build_options`] produces.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ServerResult;
use crate::net::BindOptions;
use crate::tls::context::{ContextResolver, SecurityContext};

/// Root configuration for the TLS front-end.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GateConfig {
    /// Listener configuration (bind address, socket options, SNI policy).
    pub listener: ListenerConfig,

    /// Default certificate material and ALPN settings.
    pub tls: TlsSettings,

    /// Per-hostname certificate bundles.
    pub hosts: Vec<HostConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8443").
    pub bind_address: String,

    /// Listen backlog. Zero lets the server pick.
    pub backlog: u32,

    /// Restrict an IPv6 listener to IPv6 traffic only.
    pub v6_only: bool,

    /// Set `SO_REUSEADDR` before binding.
    pub reuse_address: bool,

    /// Maximum connections in the pre-handshake pipeline.
    pub max_connections: usize,

    /// Reject handshakes that omit SNI.
    pub require_sni: bool,

    /// Treat SNI values that are not public-domain shaped as absent.
    pub validate_public_domain: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8443".to_string(),
            backlog: 0,
            v6_only: false,
            reuse_address: false,
            max_connections: 10_000,
            require_sni: false,
            validate_public_domain: false,
        }
    }
}

/// Default certificate material and protocol negotiation settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TlsSettings {
    /// Certificate chain (PEM) used when no host entry matches.
    pub default_cert_path: Option<PathBuf>,

    /// Private key (PEM) paired with `default_cert_path`.
    pub default_key_path: Option<PathBuf>,

    /// ALPN protocols, most preferred first (e.g., ["h2", "http/1.1"]).
    pub alpn: Vec<String>,
}

/// One hostname's certificate bundle.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostConfig {
    /// Hostname clients present via SNI (exact match).
    pub hostname: String,

    /// Path to the certificate chain file (PEM).
    pub cert_path: PathBuf,

    /// Path to the private key file (PEM).
    pub key_path: PathBuf,
}

impl GateConfig {
    /// Loads every configured certificate bundle and assembles the bind
    /// options: a map-backed resolver over `hosts` plus the default context
    /// from `tls`, with the listener's policy flags carried over.
    pub fn build_options(&self) -> ServerResult<BindOptions> {
        let default_context = match (&self.tls.default_cert_path, &self.tls.default_key_path) {
            (Some(cert), Some(key)) => Some(SecurityContext::from_pem_files(cert, key)?),
            _ => None,
        };

        let mut contexts: HashMap<String, SecurityContext> =
            HashMap::with_capacity(self.hosts.len());
        for host in &self.hosts {
            let context = SecurityContext::from_pem_files(&host.cert_path, &host.key_path)?;
            contexts.insert(host.hostname.clone(), context);
        }

        let resolver: Option<ContextResolver> = if contexts.is_empty() {
            None
        } else {
            Some(Arc::new(move |hostname: &str| {
                contexts.get(hostname).cloned()
            }))
        };

        Ok(BindOptions {
            supported_protocols: if self.tls.alpn.is_empty() {
                None
            } else {
                Some(self.tls.alpn.clone())
            },
            default_context,
            resolver,
            require_sni: self.listener.require_sni,
            validate_public_domain: self.listener.validate_public_domain,
            backlog: self.listener.backlog,
            v6_only: self.listener.v6_only,
            reuse_address: self.listener.reuse_address,
            max_connections: self.listener.max_connections,
        })
    }
}
