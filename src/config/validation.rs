//! Configuration validation logic.

use std::collections::HashSet;

use crate::config::schema::GateConfig;
use crate::tls::hostname;

/// Error type for configuration validation failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Validation error: {}", self.0)
    }
}

/// Validate a GateConfig for semantic correctness.
pub fn validate_config(config: &GateConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    // 1. The bind address must parse.
    if config.listener.bind_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError(format!(
            "listener.bind_address '{}' is not a valid socket address",
            config.listener.bind_address
        )));
    }

    // 2. Default cert and key come as a pair.
    match (
        &config.tls.default_cert_path,
        &config.tls.default_key_path,
    ) {
        (Some(_), None) => errors.push(ValidationError(
            "tls.default_cert_path set without tls.default_key_path".to_string(),
        )),
        (None, Some(_)) => errors.push(ValidationError(
            "tls.default_key_path set without tls.default_cert_path".to_string(),
        )),
        _ => {}
    }

    // 3. Host entries: well-formed, unique hostnames with both paths.
    let mut seen: HashSet<&str> = HashSet::new();
    for host in &config.hosts {
        if !hostname::is_hostname(&host.hostname) {
            errors.push(ValidationError(format!(
                "host '{}' is not a valid hostname",
                host.hostname
            )));
        }
        if !seen.insert(host.hostname.as_str()) {
            errors.push(ValidationError(format!(
                "host '{}' is configured more than once",
                host.hostname
            )));
        }
        if host.cert_path.as_os_str().is_empty() {
            errors.push(ValidationError(format!(
                "host '{}' has an empty cert_path",
                host.hostname
            )));
        }
        if host.key_path.as_os_str().is_empty() {
            errors.push(ValidationError(format!(
                "host '{}' has an empty key_path",
                host.hostname
            )));
        }
    }

    // 4. A front-end with no certificate material cannot serve anything.
    if config.hosts.is_empty() && config.tls.default_cert_path.is_none() {
        errors.push(ValidationError(
            "no host entries and no default certificate configured".to_string(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
