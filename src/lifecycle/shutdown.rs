//! Listener shutdown coordination.

use tokio::sync::watch;

/// Closed-once switch that tells the accept loop to drop its listener.
///
/// Triggering is idempotent: repeated triggers are no-ops, so a second
/// termination signal can never close the listener twice.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Trigger the shutdown. Returns `true` only for the first call.
    pub fn trigger(&self) -> bool {
        self.tx.send_if_modified(|closed| !std::mem::replace(closed, true))
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of [`Shutdown`].
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolve once shutdown has been triggered (immediately if it already was).
    pub async fn recv(&mut self) {
        // An error means every `Shutdown` handle is gone; nobody can trigger
        // anymore, so treat it as shutdown as well.
        let _ = self.rx.wait_for(|closed| *closed).await;
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }
}
