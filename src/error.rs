//! Crate-wide error type.
//!
//! # Taxonomy
//! - Startup errors (`InvalidAddress`, `KeyMaterial`, `TrustStore`, `Tls`,
//!   `Bind`, `Config`) abort the process before it starts serving.
//! - Lifecycle errors (`Spawn`, `Signal`, `SignalHandler`) are logged by the
//!   coordinator; a failed reload leaves the running process in place.
//! - Per-connection failures never surface here; the relay logs and drops them.

use std::path::PathBuf;

use crate::config::ConfigError;

/// Errors produced while starting or supervising the proxy.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// A `host:port` string could not be decoded.
    #[error("invalid address {address:?}: {reason}")]
    InvalidAddress {
        address: String,
        reason: &'static str,
    },

    /// The private key or certificate chain was unreadable or malformed.
    #[error("key material error in {}: {reason}", .path.display())]
    KeyMaterial { path: PathBuf, reason: String },

    /// The CA bundle was unreadable, malformed, or empty.
    #[error("trust store error in {}: {reason}", .path.display())]
    TrustStore { path: PathBuf, reason: String },

    /// rustls rejected the assembled server configuration.
    #[error("TLS configuration error: {0}")]
    Tls(String),

    /// The listening socket could not be created or bound.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// The startup configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The replacement process could not be started.
    #[error("failed to spawn replacement process: {0}")]
    Spawn(#[source] std::io::Error),

    /// Delivering a signal to another process failed.
    #[error("failed to signal process {pid}: {source}")]
    Signal {
        pid: i32,
        #[source]
        source: nix::errno::Errno,
    },

    /// Registering an OS signal handler failed.
    #[error("failed to install signal handler: {0}")]
    SignalHandler(#[source] std::io::Error),
}

impl ProxyError {
    pub(crate) fn invalid_address(address: &str, reason: &'static str) -> Self {
        ProxyError::InvalidAddress {
            address: address.to_string(),
            reason,
        }
    }

    pub(crate) fn bind(address: impl Into<String>, source: std::io::Error) -> Self {
        ProxyError::Bind {
            address: address.into(),
            source,
        }
    }

    /// Whether this error happened before the proxy started serving.
    pub fn is_startup_error(&self) -> bool {
        matches!(
            self,
            ProxyError::InvalidAddress { .. }
                | ProxyError::KeyMaterial { .. }
                | ProxyError::TrustStore { .. }
                | ProxyError::Tls(_)
                | ProxyError::Bind { .. }
                | ProxyError::Config(_)
        )
    }
}
