//! mtls-proxy
//!
//! Terminates mutual TLS on a listening port and relays each authorized
//! connection to a single plain-TCP backend.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────┐
//!                      │                  MTLS PROXY                  │
//!     TLS client       │  ┌──────────┐   ┌──────────┐   ┌──────────┐  │
//!     ─────────────────┼─▶│ listener │──▶│   tls    │──▶│  relay   │──┼──▶ Backend
//!                      │  │SO_REUSE- │   │ CA chain │   │ copy ⇄   │  │    (TCP)
//!                      │  │  PORT    │   │ + OU     │   │          │  │
//!                      │  └──────────┘   └──────────┘   └──────────┘  │
//!                      │                                              │
//!     SIGUSR1 ─────────┼─▶ lifecycle: spawn replacement (--graceful)  │
//!     SIGTERM/SIGINT ──┼─▶ lifecycle: close listener, drain, exit     │
//!                      └──────────────────────────────────────────────┘
//! ```

use clap::Parser;
use tracing::Instrument;

use mtls_proxy::config::{load_config, Cli};
use mtls_proxy::lifecycle::{startup, DrainOutcome};
use mtls_proxy::observability::logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    logging::init(config.syslog);
    let span = logging::process_span();

    let outcome = async {
        tracing::info!(
            version = env!("CARGO_PKG_VERSION"),
            graceful_child = config.graceful_child,
            "mtls-proxy starting"
        );

        match startup::run(config).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::error!(error = %e, "Startup failed");
                Err(e)
            }
        }
    }
    .instrument(span)
    .await?;

    match outcome {
        DrainOutcome::Drained => tracing::info!("Shutdown complete"),
        DrainOutcome::DeadlineExceeded { remaining } => {
            tracing::warn!(remaining, "Shutdown complete, open connections were cut off")
        }
        DrainOutcome::Abandoned => tracing::warn!("Shutdown without a completed drain"),
    }
    Ok(())
}
