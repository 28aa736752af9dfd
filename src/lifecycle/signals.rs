//! OS signal handling.
//!
//! # Responsibilities
//! - Register handlers for SIGUSR1 (reload), SIGTERM and SIGINT (shutdown)
//! - Translate each delivery into a `LifecycleEvent` on the coordinator's queue
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Handlers stay installed for the whole process lifetime, so repeated
//!   signals reach the state machine instead of the default disposition

use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::ProxyError;
use crate::lifecycle::state::LifecycleEvent;

/// Install the handlers and forward deliveries to `events`.
///
/// Handlers are registered before this returns; forwarding stops once the
/// receiving side of `events` is dropped.
pub fn forward_signals(
    events: mpsc::UnboundedSender<LifecycleEvent>,
) -> Result<JoinHandle<()>, ProxyError> {
    let mut reload = install(SignalKind::user_defined1())?;
    let mut terminate = install(SignalKind::terminate())?;
    let mut interrupt = install(SignalKind::interrupt())?;

    Ok(tokio::spawn(async move {
        loop {
            let (name, event) = tokio::select! {
                Some(()) = reload.recv() => ("SIGUSR1", LifecycleEvent::ReloadRequested),
                Some(()) = terminate.recv() => ("SIGTERM", LifecycleEvent::ShutdownRequested),
                Some(()) = interrupt.recv() => ("SIGINT", LifecycleEvent::ShutdownRequested),
                else => break,
            };

            tracing::info!(signal = name, "Signal received");
            if events.send(event).is_err() {
                break;
            }
        }
    }))
}

fn install(kind: SignalKind) -> Result<Signal, ProxyError> {
    signal(kind).map_err(ProxyError::SignalHandler)
}
