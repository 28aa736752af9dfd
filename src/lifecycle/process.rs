//! Process-tree side of the reload handoff.
//!
//! # Responsibilities
//! - Spawn a replacement process with the original arguments plus `--graceful`
//! - Reap the replacement and report it if it exits on its own
//! - Announce "serving, you may retire" to the parent process
//!
//! # Design Decisions
//! - The announcement reuses SIGTERM so parent and child need no channel
//!   besides the process hierarchy
//! - Both operations sit behind `ProcessControl`, so the handoff can be
//!   exercised in-process

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;

use nix::sys::signal::{kill, Signal};
use nix::unistd::{getppid, Pid};
use tokio::process::Command;
use tracing::Instrument;

use crate::error::ProxyError;
use crate::lifecycle::coordinator::EventSender;
use crate::lifecycle::state::LifecycleEvent;

/// Marker flag appended to the arguments of a reload child.
pub const GRACEFUL_FLAG: &str = "--graceful";

/// Process operations the lifecycle coordinator depends on.
pub trait ProcessControl: Send + Sync {
    /// Start a replacement process. Returns its pid.
    ///
    /// If the replacement exits on its own, `ReplacementFailed` is sent on
    /// `events`; the state machine ignores it once this process is draining.
    fn spawn_replacement(&self, events: &EventSender) -> Result<u32, ProxyError>;

    /// Tell the parent that this process is bound and serving.
    fn announce_ready(&self) -> Result<(), ProxyError>;
}

/// `ProcessControl` backed by real processes and signals.
#[derive(Debug, Clone)]
pub struct OsProcessControl {
    program: PathBuf,
    args: Vec<OsString>,
}

impl OsProcessControl {
    /// Re-exec the running binary with this process's arguments.
    pub fn from_current_process() -> Result<Self, ProxyError> {
        let program = std::env::current_exe().map_err(ProxyError::Spawn)?;
        Ok(Self::new(program, std::env::args_os().skip(1)))
    }

    pub fn new(program: PathBuf, args: impl IntoIterator<Item = OsString>) -> Self {
        Self {
            program,
            args: replacement_args(args),
        }
    }

    /// Arguments a replacement is started with.
    pub fn args(&self) -> &[OsString] {
        &self.args
    }
}

impl ProcessControl for OsProcessControl {
    fn spawn_replacement(&self, events: &EventSender) -> Result<u32, ProxyError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(ProxyError::Spawn)?;

        let pid = child.id().unwrap_or_default();
        tracing::info!(pid, program = %self.program.display(), "Spawned replacement process");

        // Reap the child so a replacement that dies during startup neither
        // lingers as a zombie nor leaves this process stuck in RELOADING.
        let events = events.clone();
        tokio::spawn(
            async move {
                match child.wait().await {
                    Ok(status) => tracing::warn!(pid, %status, "Replacement process exited"),
                    Err(e) => tracing::error!(pid, error = %e, "Failed to wait for replacement process"),
                }
                let _ = events.send(LifecycleEvent::ReplacementFailed);
            }
            .in_current_span(),
        );

        Ok(pid)
    }

    fn announce_ready(&self) -> Result<(), ProxyError> {
        let parent = getppid();
        tracing::info!(parent_pid = parent.as_raw(), "Sending SIGTERM to parent");
        signal_process(parent, Signal::SIGTERM)
    }
}

fn signal_process(pid: Pid, signal: Signal) -> Result<(), ProxyError> {
    kill(pid, signal).map_err(|source| ProxyError::Signal {
        pid: pid.as_raw(),
        source,
    })
}

/// Original arguments with exactly one trailing graceful marker.
fn replacement_args(args: impl IntoIterator<Item = OsString>) -> Vec<OsString> {
    let mut args: Vec<OsString> = args.into_iter().filter(|arg| arg != GRACEFUL_FLAG).collect();
    args.push(OsString::from(GRACEFUL_FLAG));
    args
}
