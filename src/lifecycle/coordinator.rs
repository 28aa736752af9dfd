//! Event loop driving the lifecycle state machine.
//!
//! Every input (OS signals, startup readiness, spawn failures, drain
//! completion) arrives on one unbounded queue; the coordinator feeds it to
//! `LifecycleMachine` and carries out the returned actions.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::lifecycle::process::ProcessControl;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::state::{Action, LifecycleEvent, LifecycleMachine};
use crate::net::connection::ConnectionTracker;
use crate::net::relay::AcceptLoopExit;

/// How a coordinator run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every connection finished on its own.
    Drained,
    /// The drain deadline passed with connections still open.
    DeadlineExceeded { remaining: u64 },
    /// The drain waiter failed or the event queue closed before termination.
    Abandoned,
}

pub type EventSender = mpsc::UnboundedSender<LifecycleEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<LifecycleEvent>;

/// Create the lifecycle event queue.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Everything the coordinator supervises.
pub struct Supervised {
    pub shutdown: Shutdown,
    pub tracker: ConnectionTracker,
    pub accept_task: JoinHandle<AcceptLoopExit>,
}

/// Owns the state machine and performs its side effects.
pub struct Coordinator<P> {
    machine: LifecycleMachine,
    process: P,
    shutdown: Shutdown,
    tracker: ConnectionTracker,
    accept_task: Option<JoinHandle<AcceptLoopExit>>,
    drain_task: Option<JoinHandle<DrainOutcome>>,
    drain_timeout: Option<Duration>,
    events_tx: EventSender,
    events_rx: EventReceiver,
}

impl<P: ProcessControl> Coordinator<P> {
    pub fn new(
        graceful_child: bool,
        process: P,
        supervised: Supervised,
        drain_timeout: Option<Duration>,
        (events_tx, events_rx): (EventSender, EventReceiver),
    ) -> Self {
        Self {
            machine: LifecycleMachine::new(graceful_child),
            process,
            shutdown: supervised.shutdown,
            tracker: supervised.tracker,
            accept_task: Some(supervised.accept_task),
            drain_task: None,
            drain_timeout,
            events_tx,
            events_rx,
        }
    }

    /// Process events until the machine reaches `TERMINATED`.
    pub async fn run(mut self) -> DrainOutcome {
        while let Some(event) = self.events_rx.recv().await {
            let from = self.machine.state();
            let actions = self.machine.handle(event);
            let to = self.machine.state();

            if from != to {
                tracing::info!(event = ?event, from = %from, to = %to, "Lifecycle transition");
            } else {
                tracing::debug!(event = ?event, state = %to, "Lifecycle event ignored");
            }

            for action in actions {
                if action == Action::Exit {
                    return self.finish().await;
                }
                self.perform(action);
            }
        }

        tracing::warn!(state = %self.machine.state(), "Lifecycle event queue closed");
        DrainOutcome::Abandoned
    }

    fn perform(&mut self, action: Action) {
        match action {
            Action::AnnounceReady => {
                if let Err(e) = self.process.announce_ready() {
                    tracing::error!(error = %e, "Failed to announce readiness to parent");
                }
            }
            Action::SpawnReplacement => match self.process.spawn_replacement(&self.events_tx) {
                Ok(pid) => tracing::info!(child_pid = pid, "Waiting for replacement to take over"),
                Err(e) => {
                    tracing::error!(error = %e, "Reload failed, continuing to serve");
                    let _ = self.events_tx.send(LifecycleEvent::ReplacementFailed);
                }
            },
            Action::CloseListener => {
                if self.shutdown.trigger() {
                    tracing::info!(active = self.tracker.active_count(), "Closing listener");
                }
            }
            Action::AwaitDrain => self.spawn_drain_waiter(),
            Action::Exit => {}
        }
    }

    /// Emit `Drained` once the accept loop is gone and no connection is left.
    fn spawn_drain_waiter(&mut self) {
        let accept_task = self.accept_task.take();
        let tracker = self.tracker.clone();
        let events = self.events_tx.clone();
        let deadline = self.drain_timeout;

        self.drain_task = Some(tokio::spawn(async move {
            let drained = {
                let tracker = tracker.clone();
                async move {
                    if let Some(task) = accept_task {
                        let _ = task.await;
                    }
                    tracker.wait_idle().await;
                }
            };

            let outcome = match deadline {
                None => {
                    drained.await;
                    DrainOutcome::Drained
                }
                Some(limit) => match tokio::time::timeout(limit, drained).await {
                    Ok(()) => DrainOutcome::Drained,
                    Err(_) => {
                        let remaining = tracker.active_count();
                        tracing::warn!(remaining, timeout = ?limit, "Drain deadline passed with connections still open");
                        DrainOutcome::DeadlineExceeded { remaining }
                    }
                },
            };

            let _ = events.send(LifecycleEvent::Drained);
            outcome
        }));
    }

    async fn finish(&mut self) -> DrainOutcome {
        let outcome = match self.drain_task.take() {
            Some(task) => task.await.unwrap_or(DrainOutcome::Abandoned),
            None => DrainOutcome::Drained,
        };
        tracing::info!(outcome = ?outcome, "All connections closed, shutting down");
        outcome
    }
}
