//! Shutdown coordination
//!
//! A watch-channel token shared by every long-running stage. `main` owns the
//! `Shutdown` handles and triggers them in order: the HTTP surface first,
//! then (after the ingest drain) the root token that stops the stream hub
//! and the retention sweeper.

use tokio::sync::watch;

/// Owning side of a shutdown signal
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Signal every outstanding token
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    /// A token that resolves once `trigger` has been called
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of a shutdown signal
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// Resolve when the signal fires (or immediately if it already has).
    /// Also resolves if the owning `Shutdown` was dropped.
    pub async fn cancelled(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}
