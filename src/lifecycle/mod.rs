//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load TLS policy → Bind shared port → Start accept loop → ListenerReady
//!
//! Events (signals.rs, coordinator.rs):
//!     SIGUSR1        → ReloadRequested   → spawn replacement (process.rs)
//!     SIGTERM/SIGINT → ShutdownRequested → close listener (shutdown.rs) → drain
//!     drain complete → Drained           → exit
//!
//! Reload handoff:
//!     parent LISTENING ──SIGUSR1──▶ RELOADING ──spawn──▶ child STARTING
//!     child LISTENING ──SIGTERM to parent──▶ parent DRAINING ──▶ TERMINATED
//! ```
//!
//! # Design Decisions
//! - The state machine (state.rs) is pure; all effects live in the coordinator
//! - Readiness of a replacement is announced with the same SIGTERM an operator
//!   would send, so the two processes share nothing but the process tree
//! - Drain is unbounded unless a deadline is configured

pub mod coordinator;
pub mod process;
pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod state;

pub use coordinator::{event_channel, Coordinator, DrainOutcome, EventReceiver, EventSender};
pub use process::{OsProcessControl, ProcessControl, GRACEFUL_FLAG};
pub use shutdown::{Shutdown, ShutdownSignal};
pub use startup::{launch, launch_with, ProxyHandle};
pub use state::{Action, LifecycleEvent, LifecycleMachine, LifecycleState};
