//! Configuration schema definitions.
//!
//! `FileConfig` is the raw, all-optional shape shared by the TOML file and the
//! command line; `StartupConfig` is the validated, immutable result.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::net::address::NetAddress;

/// Settings as read from a config file (or assembled from flags).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Address and port to listen on (e.g., "0.0.0.0:8443").
    pub listen: Option<String>,

    /// Address to forward connections to.
    pub target: Option<String>,

    /// Accepted client organizational units.
    pub clients: Vec<String>,

    /// Path to private key file (PEM).
    pub key: Option<PathBuf>,

    /// Path to certificate chain file (PEM).
    pub cert: Option<PathBuf>,

    /// Path to certificate authority bundle file (PEM).
    pub cacert: Option<PathBuf>,

    /// Send logs to syslog instead of stderr.
    pub syslog: Option<bool>,

    /// Upper bound on the drain phase, in seconds. Unbounded when absent.
    pub drain_timeout_secs: Option<u64>,
}

impl FileConfig {
    /// Overlay `other` on top of `self`; values set in `other` win.
    ///
    /// A non-empty `clients` list replaces the base list instead of extending it.
    pub fn merge(mut self, other: FileConfig) -> FileConfig {
        if other.listen.is_some() {
            self.listen = other.listen;
        }
        if other.target.is_some() {
            self.target = other.target;
        }
        if !other.clients.is_empty() {
            self.clients = other.clients;
        }
        if other.key.is_some() {
            self.key = other.key;
        }
        if other.cert.is_some() {
            self.cert = other.cert;
        }
        if other.cacert.is_some() {
            self.cacert = other.cacert;
        }
        if other.syslog.is_some() {
            self.syslog = other.syslog;
        }
        if other.drain_timeout_secs.is_some() {
            self.drain_timeout_secs = other.drain_timeout_secs;
        }
        self
    }
}

/// Key material and client policy inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSettings {
    pub key_path: PathBuf,
    pub cert_path: PathBuf,
    pub ca_bundle_path: PathBuf,
    /// Never empty.
    pub allowed_ous: BTreeSet<String>,
}

/// Validated configuration, fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupConfig {
    pub listen: NetAddress,
    pub target: NetAddress,
    pub tls: TlsSettings,
    pub syslog: bool,
    /// Set when this process was spawned by a reloading parent.
    pub graceful_child: bool,
    pub drain_timeout: Option<Duration>,
}
