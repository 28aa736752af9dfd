//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the `tracing` subscriber
//! - Route output to stderr or syslog
//! - Provide the per-process root span
//!
//! # Design Decisions
//! - Log level configurable via `RUST_LOG`, defaulting to `mtls_proxy=info`
//! - Syslog lines carry no timestamp; the system log adds its own

use syslog_tracing::{Facility, Options, Syslog};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "mtls_proxy=info";

/// Install the global subscriber. Call once, before anything logs.
pub fn init(use_syslog: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    if use_syslog {
        match Syslog::new(c"mtls-proxy", Options::LOG_PID, Facility::Daemon) {
            Some(writer) => {
                registry
                    .with(fmt::layer().with_writer(writer).with_ansi(false).without_time())
                    .init();
                return;
            }
            None => eprintln!("syslog logger already initialized, logging to stderr"),
        }
    }

    registry.with(fmt::layer().with_writer(std::io::stderr)).init();
}

/// Root span for everything this process logs.
pub fn process_span() -> tracing::Span {
    tracing::info_span!("proxy", pid = std::process::id())
}
