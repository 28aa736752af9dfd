//! Process lifecycle state machine.
//!
//! ```text
//!   STARTING ──ListenerReady──▶ LISTENING ◀──ReplacementFailed── RELOADING
//!                                  │  └──────ReloadRequested──────▶ │
//!                                  │                                │
//!                                  └────ShutdownRequested──┬────────┘
//!                                                          ▼
//!                               TERMINATED ◀──Drained── DRAINING
//! ```
//!
//! The machine is synchronous and side-effect free: it consumes events and
//! returns the actions the coordinator must perform.

use std::fmt;

/// Lifecycle states of one proxy process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Listening,
    /// A replacement was spawned; waiting for it to announce readiness.
    Reloading,
    /// Listener closed; waiting for live connections to finish.
    Draining,
    Terminated,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Starting => "STARTING",
            LifecycleState::Listening => "LISTENING",
            LifecycleState::Reloading => "RELOADING",
            LifecycleState::Draining => "DRAINING",
            LifecycleState::Terminated => "TERMINATED",
        };
        f.write_str(name)
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The TLS listener is bound and the accept loop is running.
    ListenerReady,
    /// Operator asked for a graceful reload.
    ReloadRequested,
    /// Termination requested, by an operator or by a ready replacement.
    ShutdownRequested,
    /// Spawning the replacement process failed.
    ReplacementFailed,
    /// The accept loop has exited and no connection is left.
    Drained,
}

/// Side effects requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Tell the parent process that this replacement is serving.
    AnnounceReady,
    /// Start a replacement process with the same arguments.
    SpawnReplacement,
    /// Stop accepting: close the listener.
    CloseListener,
    /// Start waiting for the live-connection count to reach zero.
    AwaitDrain,
    /// Leave the process with a success status.
    Exit,
}

/// The lifecycle state machine of one process.
#[derive(Debug, Clone)]
pub struct LifecycleMachine {
    state: LifecycleState,
    graceful_child: bool,
    replacements: u32,
}

impl LifecycleMachine {
    /// `graceful_child` marks a process spawned by a reloading parent.
    pub fn new(graceful_child: bool) -> Self {
        Self {
            state: LifecycleState::Starting,
            graceful_child,
            replacements: 0,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Number of replacement spawns requested so far.
    pub fn replacements(&self) -> u32 {
        self.replacements
    }

    /// Apply `event` and return the actions to perform, in order.
    ///
    /// Events that do not apply to the current state are ignored and yield
    /// no actions; in particular a repeated shutdown while draining is a no-op.
    pub fn handle(&mut self, event: LifecycleEvent) -> Vec<Action> {
        use LifecycleEvent::*;
        use LifecycleState::*;

        match (self.state, event) {
            (Starting, ListenerReady) => {
                self.state = Listening;
                if self.graceful_child {
                    vec![Action::AnnounceReady]
                } else {
                    Vec::new()
                }
            }
            (Listening | Reloading, ReloadRequested) => {
                self.state = Reloading;
                self.replacements += 1;
                vec![Action::SpawnReplacement]
            }
            (Reloading, ReplacementFailed) => {
                self.state = Listening;
                Vec::new()
            }
            (Starting | Listening | Reloading, ShutdownRequested) => {
                self.state = Draining;
                vec![Action::CloseListener, Action::AwaitDrain]
            }
            (Draining, Drained) => {
                self.state = Terminated;
                vec![Action::Exit]
            }
            _ => Vec::new(),
        }
    }
}
