//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the TLS policy, then resolve and bind the port-sharing listener
//! - Start the accept loop and the lifecycle coordinator
//! - Report readiness to the state machine
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal and returned before serving
//! - Key material is loaded before binding, so bad certificates never
//!   leave a half-started listener behind
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;

use tracing::Instrument;

use crate::config::StartupConfig;
use crate::error::ProxyError;
use crate::lifecycle::coordinator::{
    event_channel, Coordinator, DrainOutcome, EventReceiver, EventSender, Supervised,
};
use crate::lifecycle::process::{OsProcessControl, ProcessControl};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::forward_signals;
use crate::lifecycle::state::LifecycleEvent;
use crate::net::connection::ConnectionTracker;
use crate::net::listener::{resolve, ReusePortBinder, SharedPortBinder};
use crate::net::relay::RelayEngine;
use crate::net::tls::TlsPolicy;

/// A running proxy instance.
#[derive(Debug)]
pub struct ProxyHandle {
    local_addr: SocketAddr,
    events: EventSender,
    tracker: ConnectionTracker,
    task: tokio::task::JoinHandle<DrainOutcome>,
}

impl ProxyHandle {
    /// Address the listener is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Sender for injecting lifecycle events (what the signal handlers use).
    pub fn events(&self) -> EventSender {
        self.events.clone()
    }

    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }

    pub fn is_terminated(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the instance to reach `TERMINATED`.
    pub async fn wait(self) -> DrainOutcome {
        self.task.await.unwrap_or(DrainOutcome::Abandoned)
    }
}

/// Start a proxy instance with the platform's port-sharing listener.
///
/// Must be called from within a Tokio runtime.
pub async fn launch<P>(
    config: &StartupConfig,
    process: P,
    events: (EventSender, EventReceiver),
) -> Result<ProxyHandle, ProxyError>
where
    P: ProcessControl + 'static,
{
    launch_with(config, &ReusePortBinder, process, events).await
}

/// Start a proxy instance with an explicit listener capability.
pub async fn launch_with<P>(
    config: &StartupConfig,
    binder: &dyn SharedPortBinder,
    process: P,
    (events_tx, events_rx): (EventSender, EventReceiver),
) -> Result<ProxyHandle, ProxyError>
where
    P: ProcessControl + 'static,
{
    let policy = TlsPolicy::build(&config.tls)?;
    let addr = resolve(&config.listen).await?;
    let listener = binder.bind(addr)?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| ProxyError::bind(config.listen.as_str(), e))?;

    let shutdown = Shutdown::new();
    let tracker = ConnectionTracker::new();
    let engine = RelayEngine::new(
        listener,
        policy.acceptor(),
        config.target.clone(),
        tracker.clone(),
        shutdown.subscribe(),
    );
    let accept_task = tokio::spawn(engine.run().in_current_span());

    let coordinator = Coordinator::new(
        config.graceful_child,
        process,
        Supervised {
            shutdown,
            tracker: tracker.clone(),
            accept_task,
        },
        config.drain_timeout,
        (events_tx.clone(), events_rx),
    );
    let task = tokio::spawn(coordinator.run().in_current_span());

    tracing::info!(
        address = %local_addr,
        target = %config.target,
        graceful_child = config.graceful_child,
        "Listening for connections"
    );
    // Ignored only if the coordinator is already gone, which cannot happen here.
    let _ = events_tx.send(LifecycleEvent::ListenerReady);

    Ok(ProxyHandle {
        local_addr,
        events: events_tx,
        tracker,
        task,
    })
}

/// Run the proxy as this OS process: real signals, real re-exec.
pub async fn run(config: StartupConfig) -> Result<DrainOutcome, ProxyError> {
    let process = OsProcessControl::from_current_process()?;
    let events = event_channel();
    let _signals = forward_signals(events.0.clone())?;

    let handle = launch(&config, process, events).await?;
    tracing::info!("Startup completed, waiting for connections");

    Ok(handle.wait().await)
}
