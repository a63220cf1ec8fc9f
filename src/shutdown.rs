//! Cooperative shutdown signaling
//!
//! One `ShutdownSignal` is created in the entry point and cloned into every
//! task that must stop. Triggering is sticky: the flag only ever moves from
//! running to stopped, and the first trigger is distinguishable so the
//! coordinator runs its teardown exactly once.

use std::io;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::info;

/// Sticky stop flag shared by the runtime's long-lived tasks
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    sender: watch::Sender<bool>,
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self { sender, receiver }
    }

    /// Raise the flag; true only for the call that actually raised it
    pub fn trigger(&self) -> bool {
        self.sender.send_if_modified(|stopped| {
            if *stopped {
                false
            } else {
                *stopped = true;
                true
            }
        })
    }

    /// Whether shutdown has been requested
    pub fn is_stopped(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Wait until shutdown is requested
    pub async fn stopped(&self) {
        let mut receiver = self.receiver.clone();
        while !*receiver.borrow_and_update() {
            if receiver.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Block until the process receives SIGINT or SIGTERM
///
/// Signal registration lives here, called explicitly from the entry point,
/// so the binary's lifecycle is visible in one place instead of buried in a
/// library layer.
pub async fn wait_for_termination() -> io::Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully"),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully"),
    }
    Ok(())
}
