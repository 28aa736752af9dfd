//! Configuration validation.
//!
//! # Responsibilities
//! - Check that every required setting is present
//! - Decode listen and target addresses
//! - Require a non-empty organizational-unit allow-list
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: FileConfig → Result<StartupConfig, Vec<ValidationError>>
//! - File contents (key material, CA bundle) are checked later by the TLS layer

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::schema::{FileConfig, StartupConfig, TlsSettings};
use crate::net::address::NetAddress;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    #[error("`{field}` is not a valid host:port address: {reason}")]
    InvalidAddress { field: &'static str, reason: String },

    #[error("at least one accepted client organizational unit is required")]
    NoClients,

    #[error("client organizational unit names must not be blank")]
    BlankClient,

    #[error("`drain_timeout_secs` must be greater than zero")]
    ZeroDrainTimeout,
}

/// Validate raw settings into a `StartupConfig`.
pub fn validate_config(
    raw: &FileConfig,
    graceful_child: bool,
) -> Result<StartupConfig, Vec<ValidationError>> {
    let mut errors = Vec::new();

    let listen = address(&raw.listen, "listen", &mut errors);
    let target = address(&raw.target, "target", &mut errors);
    let key_path = path(&raw.key, "key", &mut errors);
    let cert_path = path(&raw.cert, "cert", &mut errors);
    let ca_bundle_path = path(&raw.cacert, "cacert", &mut errors);

    if raw.clients.is_empty() {
        errors.push(ValidationError::NoClients);
    } else if raw.clients.iter().any(|ou| ou.trim().is_empty()) {
        errors.push(ValidationError::BlankClient);
    }

    if raw.drain_timeout_secs == Some(0) {
        errors.push(ValidationError::ZeroDrainTimeout);
    }

    match (listen, target, key_path, cert_path, ca_bundle_path) {
        (Some(listen), Some(target), Some(key_path), Some(cert_path), Some(ca_bundle_path))
            if errors.is_empty() =>
        {
            Ok(StartupConfig {
                listen,
                target,
                tls: TlsSettings {
                    key_path,
                    cert_path,
                    ca_bundle_path,
                    allowed_ous: raw.clients.iter().cloned().collect::<BTreeSet<_>>(),
                },
                syslog: raw.syslog.unwrap_or(false),
                graceful_child,
                drain_timeout: raw.drain_timeout_secs.map(Duration::from_secs),
            })
        }
        _ => Err(errors),
    }
}

fn address(
    value: &Option<String>,
    field: &'static str,
    errors: &mut Vec<ValidationError>,
) -> Option<NetAddress> {
    let Some(value) = value else {
        errors.push(ValidationError::Missing(field));
        return None;
    };
    match value.parse::<NetAddress>() {
        Ok(addr) => Some(addr),
        Err(e) => {
            errors.push(ValidationError::InvalidAddress {
                field,
                reason: e.to_string(),
            });
            None
        }
    }
}

fn path(
    value: &Option<PathBuf>,
    field: &'static str,
    errors: &mut Vec<ValidationError>,
) -> Option<PathBuf> {
    match value {
        Some(path) if !path.as_os_str().is_empty() => Some(path.clone()),
        _ => {
            errors.push(ValidationError::Missing(field));
            None
        }
    }
}
