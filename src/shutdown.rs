//! # Shutdown Module
//!
//! Ctrl+C / SIGTERM handling shared by startup and the control loop.
//!
//! The signal handlers are installed by [`listen`] before any GPIO is claimed,
//! so a signal during arming or controller discovery unwinds through the
//! normal path and the actuators' teardown still runs.

use std::future::Future;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::info;

use crate::error::Result;

/// Sets the shutdown request.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

/// Observes the shutdown request. Once set it stays set.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Unconnected trigger/observer pair.
#[must_use]
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

/// Install SIGINT and SIGTERM handlers and return the request they set.
///
/// Must be called from within the tokio runtime.
///
/// # Errors
///
/// Returns `Io` if a handler cannot be registered.
pub fn listen() -> Result<Shutdown> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let (trigger, shutdown) = channel();

    tokio::spawn(async move {
        tokio::select! {
            _ = interrupt.recv() => info!("Received Ctrl+C"),
            _ = terminate.recv() => info!("Received SIGTERM"),
        }
        trigger.trigger();
    });
    Ok(shutdown)
}

impl Shutdown {
    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Completes once shutdown is requested.
    pub async fn requested(&mut self) {
        if self.rx.wait_for(|requested| *requested).await.is_err() {
            // Trigger gone without firing
            std::future::pending::<()>().await;
        }
    }

    /// Run `step` unless shutdown is requested first.
    ///
    /// Returns `None` on shutdown; `step` is dropped, which releases whatever
    /// it had acquired so far.
    pub async fn guard<F: Future>(&mut self, step: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.requested() => None,
            output = step => Some(output),
        }
    }
}
